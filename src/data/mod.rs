//! Samples, batches and dataset loading

/// Image triples and stacked batches
pub mod batch;
/// Dataset directory layouts
pub mod folders;
/// Shuffled batch iteration
pub mod loader;

pub use batch::{Batch, ImagePair};
pub use folders::{ColorizationFolder, SketchSimplificationFolder};
pub use loader::{DataLoader, PairSource};
