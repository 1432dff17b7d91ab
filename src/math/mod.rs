//! Mathematical utilities for sampling and resampling

/// Bilinear interpolation for image resampling
pub mod interpolation;
/// Probability distributions and statistical functions
pub mod probability;
