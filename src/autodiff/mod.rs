//! Reverse-mode automatic differentiation over dynamic-rank `ndarray` tensors
//!
//! Supports higher-order gradients, which the gradient penalty relies on.

/// Gradient propagation and accumulation
pub mod backward;
/// Graph nodes and differentiable operations
pub mod var;

pub use backward::{Gradients, backward, grad};
pub use var::Var;
