//! Reconstruction losses

use crate::autodiff::Var;
use crate::io::error::Result;

/// Mean absolute error between two tensors of identical shape
///
/// # Errors
///
/// Returns an error if the shapes differ or the tensors are empty
pub fn l1_loss(prediction: &Var, target: &Var) -> Result<Var> {
    prediction.sub(target)?.abs().mean()
}

/// Mean squared error between two tensors of identical shape
///
/// # Errors
///
/// Returns an error if the shapes differ or the tensors are empty
pub fn mse_loss(prediction: &Var, target: &Var) -> Result<Var> {
    prediction.sub(target)?.square().mean()
}
