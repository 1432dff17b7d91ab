//! Hint-conditioned Wasserstein GAN training for sketch colorization and sketch simplification
//!
//! A generator maps a sketch, optionally with a sparse colour hint, to a target image while a
//! critic trained with a gradient penalty scores the result. Frozen feature encoders supply a
//! content loss alongside the adversarial and pixel terms.

#![forbid(unsafe_code)]

/// Geometric augmentation of paired images
pub mod augment;
/// Reverse-mode automatic differentiation over n-dimensional arrays
pub mod autodiff;
/// Paired datasets and batch iteration
pub mod data;
/// Hint masks, gradient penalty and the adversarial update engine
pub mod gan;
/// Input/output operations and error handling
pub mod io;
/// Mathematical utilities for interpolation and probability calculations
pub mod math;
/// Network traits, parameters, optimizers and reference networks
pub mod nn;
/// Training loop, evaluation and inference
pub mod train;

pub use io::error::{Result, TrainingError};
