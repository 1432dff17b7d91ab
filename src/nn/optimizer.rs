//! Adam optimizer with serializable moment buffers

use crate::autodiff::Gradients;
use crate::io::error::{Result, TrainingError, invalid_parameter, shape_mismatch};
use crate::nn::parameter::ParameterGroup;
use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

/// Adam hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    /// Initial step size
    pub learning_rate: f32,
    /// Decay rate of the first moment estimate
    pub beta1: f32,
    /// Decay rate of the second moment estimate
    pub beta2: f32,
    /// Denominator stabilizer
    pub epsilon: f32,
}

/// Per-parameter moment estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    /// Number of updates applied to this parameter
    pub step: u64,
    /// Exponential moving average of gradients
    pub first: ArrayD<f32>,
    /// Exponential moving average of squared gradients
    pub second: ArrayD<f32>,
}

/// Complete optimizer state as stored in checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdamState {
    /// Hyperparameters, including the learning rate in effect
    pub config: AdamConfig,
    /// Moments per parameter, `None` until the parameter first receives a gradient
    pub moments: Vec<Option<Moments>>,
}

/// Adam optimizer bound to one parameter group layout
///
/// Parameters that received no gradient in a step are left untouched and
/// their step counter does not advance.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    moments: Vec<Option<Moments>>,
}

impl Adam {
    /// Create an optimizer for a group of `parameter_count` tensors
    ///
    /// # Errors
    ///
    /// Returns an error if a hyperparameter is outside its valid range
    pub fn new(config: AdamConfig, parameter_count: usize) -> Result<Self> {
        if !(config.learning_rate.is_finite() && config.learning_rate >= 0.0) {
            return Err(invalid_parameter(
                "learning_rate",
                &config.learning_rate,
                &"must be non-negative and finite",
            ));
        }
        for (name, beta) in [("beta1", config.beta1), ("beta2", config.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(invalid_parameter(name, &beta, &"must lie in [0, 1)"));
            }
        }
        if config.epsilon <= 0.0 {
            return Err(invalid_parameter(
                "epsilon",
                &config.epsilon,
                &"must be positive",
            ));
        }
        Ok(Self {
            config,
            moments: vec![None; parameter_count],
        })
    }

    /// Current learning rate
    pub const fn learning_rate(&self) -> f32 {
        self.config.learning_rate
    }

    /// Replace the learning rate, typically from a scheduler
    pub const fn set_learning_rate(&mut self, learning_rate: f32) {
        self.config.learning_rate = learning_rate;
    }

    /// Apply one update to every parameter of `group` that has a gradient
    ///
    /// Returns the number of parameters updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the group is frozen, if its size differs from the
    /// optimizer's layout, or if a gradient's shape differs from its parameter
    pub fn step(&mut self, group: &mut ParameterGroup, gradients: &Gradients) -> Result<usize> {
        if !group.is_trainable() {
            return Err(TrainingError::FrozenParameters {
                group: group.name().to_string(),
            });
        }
        if group.len() != self.moments.len() {
            return Err(shape_mismatch(
                "optimizer layout",
                &[self.moments.len()],
                &[group.len()],
            ));
        }

        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;

        let mut updated = 0;
        for index in 0..group.len() {
            let var = group.get(index)?;
            let Some(gradient) = gradients.get(var) else {
                continue;
            };
            if gradient.shape() != var.shape() {
                return Err(shape_mismatch("optimizer step", var.shape(), gradient.shape()));
            }

            let slot = self.moments.get_mut(index).ok_or_else(|| {
                shape_mismatch("optimizer layout", &[index + 1], &[group.len()])
            })?;
            let moments = slot.get_or_insert_with(|| Moments {
                step: 0,
                first: ArrayD::zeros(gradient.raw_dim()),
                second: ArrayD::zeros(gradient.raw_dim()),
            });
            moments.step += 1;

            Zip::from(&mut moments.first)
                .and(&mut moments.second)
                .and(gradient)
                .for_each(|m, v, &g| {
                    *m = beta1.mul_add(*m, (1.0 - beta1) * g);
                    *v = beta2.mul_add(*v, (1.0 - beta2) * g * g);
                });

            let exponent = i32::try_from(moments.step).unwrap_or(i32::MAX);
            let bias_correction1 = 1.0 - beta1.powi(exponent);
            let bias_correction2_sqrt = (1.0 - beta2.powi(exponent)).sqrt();
            let step_size = learning_rate / bias_correction1;

            let mut value = var.value().clone();
            Zip::from(&mut value)
                .and(&moments.first)
                .and(&moments.second)
                .for_each(|p, &m, &v| {
                    let denominator = v.sqrt() / bias_correction2_sqrt + epsilon;
                    *p -= step_size * m / denominator;
                });

            group.update(index, value)?;
            updated += 1;
        }

        Ok(updated)
    }

    /// Copy the optimizer state for checkpointing
    pub fn state(&self) -> AdamState {
        AdamState {
            config: self.config,
            moments: self.moments.clone(),
        }
    }

    /// Replace the optimizer state from a checkpoint
    ///
    /// Every stored moment must match the shape of its parameter in `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored layout does not match this optimizer
    /// or the parameters of `group`
    pub fn load_state(&mut self, state: AdamState, group: &ParameterGroup) -> Result<()> {
        if state.moments.len() != self.moments.len() || group.len() != self.moments.len() {
            return Err(shape_mismatch(
                "optimizer state",
                &[self.moments.len()],
                &[state.moments.len()],
            ));
        }
        for (index, slot) in state.moments.iter().enumerate() {
            let Some(moments) = slot else {
                continue;
            };
            let expected = group.get(index)?.shape();
            for stored in [&moments.first, &moments.second] {
                if stored.shape() != expected {
                    return Err(shape_mismatch("optimizer state", expected, stored.shape()));
                }
            }
        }
        self.config = state.config;
        self.moments = state.moments;
        Ok(())
    }
}
