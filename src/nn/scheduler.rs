//! Step decay learning rate schedule

use crate::io::error::{Result, invalid_parameter};
use crate::nn::optimizer::Adam;

/// Multiplies the learning rate by `gamma` every `step_size` epochs
///
/// Formula: `lr_t = lr_initial * gamma^(floor(epoch / step_size))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDecay {
    initial_learning_rate: f32,
    step_size: usize,
    gamma: f32,
    epoch: usize,
}

impl StepDecay {
    /// Create a schedule positioned at epoch zero
    ///
    /// # Errors
    ///
    /// Returns an error if `step_size` is zero or `gamma` is not in (0, 1]
    pub fn new(initial_learning_rate: f32, step_size: usize, gamma: f32) -> Result<Self> {
        Self::at_epoch(initial_learning_rate, step_size, gamma, 0)
    }

    /// Create a schedule that has already advanced `epoch` times
    ///
    /// # Errors
    ///
    /// Returns an error if `step_size` is zero or `gamma` is not in (0, 1]
    pub fn at_epoch(
        initial_learning_rate: f32,
        step_size: usize,
        gamma: f32,
        epoch: usize,
    ) -> Result<Self> {
        if step_size == 0 {
            return Err(invalid_parameter("step_size", &step_size, &"must be positive"));
        }
        if !(gamma > 0.0 && gamma <= 1.0) {
            return Err(invalid_parameter("gamma", &gamma, &"must lie in (0, 1]"));
        }
        Ok(Self {
            initial_learning_rate,
            step_size,
            gamma,
            epoch,
        })
    }

    /// Number of completed schedule steps
    pub const fn epoch(&self) -> usize {
        self.epoch
    }

    /// Learning rate for the current position
    pub fn learning_rate(&self) -> f32 {
        let decays = i32::try_from(self.epoch / self.step_size).unwrap_or(i32::MAX);
        self.initial_learning_rate * self.gamma.powi(decays)
    }

    /// Advance one epoch
    pub const fn step(&mut self) {
        self.epoch += 1;
    }

    /// Write the current learning rate into `optimizer`
    pub fn apply(&self, optimizer: &mut Adam) {
        optimizer.set_learning_rate(self.learning_rate());
    }
}
