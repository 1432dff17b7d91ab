//! Hint mask synthesis and hint construction
//!
//! A mask marks the locations, at a quarter of the image resolution, where
//! reference colour is revealed to the generator. Masks are drawn fresh for
//! every batch from an injected random generator.

use crate::autodiff::Var;
use crate::io::configuration::{HINT_PROBABILITY_MEAN, HINT_PROBABILITY_STD, MASK_DOWNSCALE};
use crate::io::error::{Result, invalid_parameter, shape_mismatch};
use crate::math::probability::TruncatedNormal;
use crate::nn::layers::{avg_pool, scale_factor};
use clap::ValueEnum;
use ndarray::{Array4, ArrayD, Axis, Ix4, Slice, concatenate};
use rand::Rng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

/// How much of a batch receives hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MaskPolicy {
    /// No sample receives hints
    None,
    /// Every sample receives a stochastic mask
    All,
    /// The first half of the batch receives stochastic masks, the rest none
    Half,
}

impl MaskPolicy {
    /// Number of leading samples that receive stochastic masks
    pub const fn stochastic_samples(self, batch_size: usize) -> usize {
        match self {
            Self::None => 0,
            Self::All => batch_size,
            Self::Half => batch_size / 2,
        }
    }
}

/// Samples binary hint masks
///
/// Each stochastic sample draws an inclusion probability `p` from a
/// truncated normal once; every pixel is then revealed when a uniform draw
/// reaches the threshold `1 - p`.
#[derive(Debug, Clone, Copy)]
pub struct HintMasker {
    inclusion: TruncatedNormal,
}

impl HintMasker {
    /// Masker with inclusion probability drawn from `N(mean, std_dev)` truncated to [0, 1]
    ///
    /// # Errors
    ///
    /// Returns an error if `std_dev` is not positive and finite
    pub fn new(mean: f64, std_dev: f64) -> Result<Self> {
        Ok(Self {
            inclusion: TruncatedNormal::new(mean, std_dev, 0.0, 1.0)?,
        })
    }

    /// Masker with the default dense-hint distribution
    ///
    /// # Errors
    ///
    /// Never fails for the built-in constants; the signature follows [`Self::new`]
    pub fn standard() -> Result<Self> {
        Self::new(HINT_PROBABILITY_MEAN, HINT_PROBABILITY_STD)
    }

    /// Generate a `(batch_size, 1, spatial_size, spatial_size)` mask of zeros and ones
    ///
    /// Stochastic samples always come first, in batch order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `spatial_size` is zero
    pub fn generate_mask<R: Rng + ?Sized>(
        &self,
        policy: MaskPolicy,
        batch_size: usize,
        spatial_size: usize,
        rng: &mut R,
    ) -> Result<ArrayD<f32>> {
        if spatial_size == 0 {
            return Err(invalid_parameter("spatial_size", &spatial_size, &"must be positive"));
        }
        let mut mask = Array4::<f32>::zeros((batch_size, 1, spatial_size, spatial_size));

        for mut sample in mask
            .outer_iter_mut()
            .take(policy.stochastic_samples(batch_size))
        {
            let threshold = 1.0 - self.inclusion.sample(rng);
            sample.mapv_inplace(|_| {
                if rng.random::<f64>() >= threshold {
                    1.0
                } else {
                    0.0
                }
            });
        }

        Ok(mask.into_dyn())
    }
}

/// Mask resolution for a square image of `image_size` pixels
///
/// # Errors
///
/// Returns `InvalidParameter` unless `image_size` is a positive multiple of four
pub fn mask_spatial_size(image_size: usize) -> Result<usize> {
    if image_size == 0 || image_size % MASK_DOWNSCALE != 0 {
        return Err(invalid_parameter(
            "image_size",
            &image_size,
            &format!("must be a positive multiple of {MASK_DOWNSCALE}"),
        ));
    }
    Ok(image_size / MASK_DOWNSCALE)
}

/// Concatenate the masked reference with its mask along the channel axis
///
/// A reference larger than the mask is average-pooled to the mask
/// resolution first. The whole hint is multiplied by `multiplier`.
///
/// # Errors
///
/// Returns `ShapeMismatch` if the tensors are not rank 4, the batch sizes
/// differ, the mask has more than one channel or the resolutions are not
/// integer multiples
pub fn build_hint(
    reference: &ArrayD<f32>,
    mask: &ArrayD<f32>,
    multiplier: f32,
) -> Result<ArrayD<f32>> {
    let mask = mask
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| shape_mismatch("build_hint mask", &[0, 1, 0, 0], mask.shape()))?;
    let (batch, mask_channels, mask_h, mask_w) = mask.dim();
    if mask_channels != 1 {
        return Err(shape_mismatch("build_hint mask", &[batch, 1, mask_h, mask_w], mask.shape()));
    }

    let reference = match *reference.shape() {
        [b, _, h, w] if b == batch && h == mask_h && w == mask_w => reference.clone(),
        [b, _, h, w] if b == batch && h > mask_h && h * mask_w == w * mask_h => {
            let factor = scale_factor(h, mask_h)?;
            avg_pool(&Var::constant(reference.clone()), factor)?
                .value()
                .clone()
        }
        _ => {
            return Err(shape_mismatch(
                "build_hint reference",
                &[batch, 0, mask_h, mask_w],
                reference.shape(),
            ));
        }
    };
    let reference = reference
        .into_dimensionality::<Ix4>()
        .map_err(|_| shape_mismatch("build_hint reference", &[batch, 0, mask_h, mask_w], &[]))?;

    let expanded = mask
        .broadcast(reference.raw_dim())
        .ok_or_else(|| shape_mismatch("build_hint", reference.shape(), mask.shape()))?;
    let masked = &reference * &expanded;
    let hint = concatenate(Axis(1), &[masked.view(), mask.view()])
        .map_err(|_| shape_mismatch("build_hint concat", masked.shape(), mask.shape()))?;

    Ok(hint.mapv(|v| v * multiplier).into_dyn())
}

/// Masked reference channels of a batched hint, without its mask channel
///
/// # Errors
///
/// Returns `ShapeMismatch` unless `hint` is rank 4 with at least two channels
pub fn hint_colors(hint: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    match *hint.shape() {
        [_, channels, _, _] if channels >= 2 => {
            Ok(hint.slice_axis(Axis(1), Slice::from(..channels - 1)).to_owned())
        }
        _ => Err(shape_mismatch("hint colors", &[0, 2, 0, 0], hint.shape())),
    }
}
