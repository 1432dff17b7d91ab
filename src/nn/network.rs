//! Interfaces between the adversarial engine and concrete networks
//!
//! Image tensors are laid out as (batch, channels, height, width).

use crate::autodiff::Var;
use crate::io::error::Result;
use crate::nn::parameter::ParameterGroup;
use ndarray::ArrayD;

/// A network whose parameters are updated during training
pub trait Network {
    /// Parameters of the network
    fn parameters(&self) -> &ParameterGroup;

    /// Mutable parameters, for capability changes and optimizer steps
    fn parameters_mut(&mut self) -> &mut ParameterGroup;
}

/// Produces a target image from a sketch, an optional hint and sketch features
pub trait Generator: Network {
    /// Generate images
    ///
    /// `hint` is `None` when hints are disabled for the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs have incompatible shapes
    fn forward(&self, sketch: &Var, hint: Option<&Var>, features: &Var) -> Result<Var>;
}

/// Scores the realism of images, conditioned on sketch features
pub trait Critic: Network {
    /// Score images, returning a (batch, 1) tensor
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs have incompatible shapes
    fn forward(&self, image: &Var, features: &Var) -> Result<Var>;
}

/// Frozen backbone producing feature embeddings
pub trait FeatureExtractor {
    /// Embed images; gradients flow through to `image` when it is tracked
    ///
    /// # Errors
    ///
    /// Returns an error if the image has an unexpected shape
    fn forward(&self, image: &Var) -> Result<Var>;

    /// Embed untracked images without building a graph
    ///
    /// # Errors
    ///
    /// Returns an error if the image has an unexpected shape
    fn embed(&self, image: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        Ok(self
            .forward(&Var::constant(image.clone()))?
            .value()
            .clone())
    }
}
