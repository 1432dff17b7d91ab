//! Training loop, evaluation and inference

/// Generation from a trained checkpoint
pub mod inference;
/// Running loss averages
pub mod metrics;
/// Observers of training events
pub mod observer;
/// Epoch loop and resume
pub mod orchestrator;

pub use inference::run_inference;
pub use metrics::{EpochSummary, LossAccumulator};
pub use observer::{LoggingObserver, TrainingObserver};
pub use orchestrator::{ReferenceEngine, Trainer, TrainingReport, build_reference_engine, train};
