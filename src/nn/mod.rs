//! Parameters, optimizers and the reference networks

/// Pooling, upsampling and per-pixel linear layers
pub mod layers;
/// Reconstruction losses
pub mod loss;
/// Network interfaces used by the adversarial engine
pub mod network;
/// Adam optimizer
pub mod optimizer;
/// Parameter groups with write capabilities
pub mod parameter;
/// Pointwise reference generator, critic and encoder
pub mod reference;
/// Step decay learning rate schedule
pub mod scheduler;

pub use network::{Critic, FeatureExtractor, Generator, Network};
pub use optimizer::{Adam, AdamConfig, AdamState};
pub use parameter::{Access, NamedTensor, ParameterGroup};
pub use reference::{BackboneWeights, PixelCritic, PixelGenerator, PooledEncoder};
pub use scheduler::StepDecay;
