//! Paired augmentation for sketch simplification
//!
//! Every random decision is drawn once per pair and applied to both images,
//! so source and target stay pixel-aligned.

use crate::augment::crop::{CropBox, FixedRandomResizedCrop};
use crate::augment::geometry::{flip_horizontal, rotate_crop_max};
use crate::io::configuration::AugmentationConfig;
use crate::io::error::{Result, shape_mismatch};
use crate::io::image::gray_to_tensor;
use image::GrayImage;
use ndarray::ArrayD;
use rand::Rng;

/// Random choices made for one pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairDecisions {
    /// Source was replaced by the target
    pub identity: bool,
    /// Rotation angle in degrees
    pub angle_degrees: u32,
    /// Both images were mirrored
    pub flipped: bool,
    /// Crop taken from the rotated images
    pub crop: CropBox,
}

/// Pair augmented to the training resolution
#[derive(Debug, Clone)]
pub struct AugmentedPair {
    /// Input image
    pub source: GrayImage,
    /// Expected output image
    pub target: GrayImage,
    /// Random choices that produced the pair
    pub decisions: PairDecisions,
}

/// Identity branch, rotate-crop-max, shared flip and fixed random resized crop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairAugmenter {
    config: AugmentationConfig,
    crop: FixedRandomResizedCrop,
}

impl PairAugmenter {
    /// Augmenter producing `size`×`size` pairs
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or `size` is zero
    pub fn new(config: AugmentationConfig, size: u32) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            crop: FixedRandomResizedCrop::square(size, config.crop_scale)?,
        })
    }

    /// Augmentation settings
    pub const fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply the geometric chain to a pair, returning images and the decisions taken
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the images differ in size, or an error if
    /// they are empty
    pub fn transform<R: Rng + ?Sized>(
        &self,
        source: &GrayImage,
        target: &GrayImage,
        rng: &mut R,
    ) -> Result<AugmentedPair> {
        if source.dimensions() != target.dimensions() {
            let (sw, sh) = source.dimensions();
            let (tw, th) = target.dimensions();
            return Err(shape_mismatch(
                "augment pair",
                &[th as usize, tw as usize],
                &[sh as usize, sw as usize],
            ));
        }

        let identity = rng.random_bool(self.config.identity_probability);
        let source = if identity { target } else { source };

        let angle_degrees = rng.random_range(0..=self.config.max_rotation_degrees);
        let mut source = rotate_crop_max(source, f64::from(angle_degrees))?;
        let mut target = rotate_crop_max(target, f64::from(angle_degrees))?;

        let flipped = rng.random_bool(self.config.flip_probability);
        if flipped {
            source = flip_horizontal(&source);
            target = flip_horizontal(&target);
        }

        let (width, height) = source.dimensions();
        let crop = self.crop.sample(width, height, rng);

        Ok(AugmentedPair {
            source: self.crop.apply(&source, crop),
            target: self.crop.apply(&target, crop),
            decisions: PairDecisions {
                identity,
                angle_degrees,
                flipped,
                crop,
            },
        })
    }

    /// Augment a pair and normalise both images to (1, size, size) tensors in [-1, 1]
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::transform`]
    pub fn augment<R: Rng + ?Sized>(
        &self,
        source: &GrayImage,
        target: &GrayImage,
        rng: &mut R,
    ) -> Result<(ArrayD<f32>, ArrayD<f32>)> {
        let pair = self.transform(source, target, rng)?;
        Ok((gray_to_tensor(&pair.source), gray_to_tensor(&pair.target)))
    }
}
