//! Input/output operations and error handling

/// Training checkpoints on disk
pub mod checkpoint;
/// Command-line interface
pub mod cli;
/// Constants and run configuration files
pub mod configuration;
/// Error types and context propagation
pub mod error;
/// Image decoding, encoding and tensor conversion
pub mod image;
/// Tracing subscriber setup
pub mod logging;
/// Terminal progress bars
pub mod progress;
/// Sample strips written during evaluation
pub mod visualization;
