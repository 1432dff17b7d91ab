//! Adversarial training core: hint masks, gradient penalty and the update engine

/// Alternating critic and generator updates
pub mod engine;
/// Hint mask synthesis and hint construction
pub mod mask;
/// Gradient penalty on real/fake interpolates
pub mod penalty;

pub use engine::{AdversarialEngine, EngineSettings, Evaluation, StepLosses};
pub use mask::{HintMasker, MaskPolicy, build_hint, mask_spatial_size};
pub use penalty::{gradient_penalty, gradient_penalty_at};
