//! Named parameter tensors grouped under a single write capability
//!
//! A group is either `Frozen` or `Trainable`. Changing the capability rebuilds
//! every leaf so that graphs built afterwards do (or do not) track gradients
//! into the group; optimizers refuse to write into a frozen group.

use crate::autodiff::Var;
use crate::io::error::{Result, TrainingError, invalid_parameter, shape_mismatch};
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Whether a parameter group may be updated in the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Parameters are constants; no gradient reaches them
    Frozen,
    /// Parameters are tracked leaves and may be stepped by an optimizer
    Trainable,
}

/// Serializable copy of one named parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    /// Parameter name, unique within its group
    pub name: String,
    /// Parameter value
    pub value: ArrayD<f32>,
}

/// Ordered collection of named parameters sharing one [`Access`] capability
#[derive(Debug, Clone)]
pub struct ParameterGroup {
    name: String,
    access: Access,
    names: Vec<String>,
    vars: Vec<Var>,
}

impl ParameterGroup {
    /// Create an empty group
    pub fn new(name: impl Into<String>, access: Access) -> Self {
        Self {
            name: name.into(),
            access,
            names: Vec::new(),
            vars: Vec::new(),
        }
    }

    /// Register a parameter and return its index
    pub fn push(&mut self, name: impl Into<String>, value: ArrayD<f32>) -> usize {
        self.names.push(name.into());
        self.vars.push(Var::leaf(value, self.is_trainable()));
        self.vars.len() - 1
    }

    /// Group name used in logs and checkpoints
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current write capability
    pub const fn access(&self) -> Access {
        self.access
    }

    /// Whether the group currently accepts optimizer updates
    pub fn is_trainable(&self) -> bool {
        self.access == Access::Trainable
    }

    /// Switch capability, rebuilding leaves when it changes
    pub fn set_access(&mut self, access: Access) {
        if self.access == access {
            return;
        }
        self.access = access;
        let trainable = self.is_trainable();
        for var in &mut self.vars {
            *var = Var::leaf(var.value().clone(), trainable);
        }
    }

    /// Leaf for the parameter at `index`
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range
    pub fn get(&self, index: usize) -> Result<&Var> {
        self.vars.get(index).ok_or_else(|| {
            invalid_parameter(
                "parameter index",
                &index,
                &format!("group '{}' has {} parameters", self.name, self.vars.len()),
            )
        })
    }

    /// All leaves in registration order
    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// Number of parameter tensors
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the group holds no parameters
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Total number of scalar parameters
    pub fn num_elements(&self) -> usize {
        self.vars.iter().map(|v| v.value().len()).sum()
    }

    /// Replace the value at `index`, keeping its name and shape
    ///
    /// # Errors
    ///
    /// Returns an error if the group is frozen, `index` is out of range or the
    /// shape differs
    pub(crate) fn update(&mut self, index: usize, value: ArrayD<f32>) -> Result<()> {
        if !self.is_trainable() {
            return Err(TrainingError::FrozenParameters {
                group: self.name.clone(),
            });
        }
        let current = self.get(index)?;
        if current.shape() != value.shape() {
            return Err(shape_mismatch("parameter update", current.shape(), value.shape()));
        }
        if let Some(slot) = self.vars.get_mut(index) {
            *slot = Var::leaf(value, true);
        }
        Ok(())
    }

    /// Copy every parameter out for serialization
    pub fn snapshot(&self) -> Vec<NamedTensor> {
        self.names
            .iter()
            .zip(&self.vars)
            .map(|(name, var)| NamedTensor {
                name: name.clone(),
                value: var.value().clone(),
            })
            .collect()
    }

    /// Overwrite every parameter from a snapshot
    ///
    /// The snapshot must name exactly the same parameters, in order, with
    /// identical shapes; nothing is changed unless all of them match.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first mismatch
    pub fn restore(&mut self, snapshot: &[NamedTensor]) -> Result<()> {
        if snapshot.len() != self.vars.len() {
            return Err(invalid_parameter(
                "snapshot",
                &snapshot.len(),
                &format!("group '{}' has {} parameters", self.name, self.vars.len()),
            ));
        }
        for ((name, var), entry) in self.names.iter().zip(&self.vars).zip(snapshot) {
            if *name != entry.name {
                return Err(invalid_parameter(
                    "snapshot",
                    &entry.name,
                    &format!("expected parameter '{name}'"),
                ));
            }
            if var.shape() != entry.value.shape() {
                return Err(shape_mismatch("restore", var.shape(), entry.value.shape()));
            }
        }
        let trainable = self.is_trainable();
        for (var, entry) in self.vars.iter_mut().zip(snapshot) {
            *var = Var::leaf(entry.value.clone(), trainable);
        }
        Ok(())
    }
}

/// Draw a tensor from a zero-mean normal distribution
///
/// # Errors
///
/// Returns an error if `std_dev` is negative or not finite
pub fn normal_init<R: Rng + ?Sized>(
    shape: &[usize],
    std_dev: f32,
    rng: &mut R,
) -> Result<ArrayD<f32>> {
    let normal =
        Normal::new(0.0_f32, std_dev).map_err(|e| invalid_parameter("std_dev", &std_dev, &e))?;
    Ok(ArrayD::from_shape_simple_fn(IxDyn(shape), || {
        normal.sample(rng)
    }))
}
