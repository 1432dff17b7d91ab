//! Geometric augmentation of paired training images

/// Random resized crop with a shared box
pub mod crop;
/// Border-free rotation and flipping
pub mod geometry;
/// Paired augmentation chain
pub mod pipeline;

pub use crop::{CropBox, FixedRandomResizedCrop};
pub use geometry::{flip_horizontal, largest_rotated_rect, rotate_crop_max};
pub use pipeline::{AugmentedPair, PairAugmenter, PairDecisions};
