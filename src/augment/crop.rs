//! Random resized crop whose box is sampled once and reused for a whole pair

use crate::io::configuration::CROP_ATTEMPTS;
use crate::io::error::{Result, invalid_parameter};
use image::{GrayImage, imageops};
use rand::Rng;

/// Axis-aligned crop box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Box width
    pub width: u32,
    /// Box height
    pub height: u32,
}

/// Crop of random area and aspect ratio, resized to a square output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRandomResizedCrop {
    size: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
}

impl FixedRandomResizedCrop {
    /// Crop with area fraction in `scale` and a 1:1 aspect ratio
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or `scale` is not within (0, 1]
    pub fn square(size: u32, scale: (f64, f64)) -> Result<Self> {
        Self::new(size, scale, (1.0, 1.0))
    }

    /// Crop with area fraction in `scale` and aspect ratio (width / height) in `ratio`
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero, `scale` is not within (0, 1] or
    /// `ratio` is not a positive ordered range
    pub fn new(size: u32, scale: (f64, f64), ratio: (f64, f64)) -> Result<Self> {
        if size == 0 {
            return Err(invalid_parameter("size", &size, &"must be positive"));
        }
        if !(scale.0 > 0.0 && scale.0 <= scale.1 && scale.1 <= 1.0) {
            return Err(invalid_parameter(
                "scale",
                &format!("{scale:?}"),
                &"must satisfy 0 < min <= max <= 1",
            ));
        }
        if !(ratio.0 > 0.0 && ratio.0 <= ratio.1 && ratio.1.is_finite()) {
            return Err(invalid_parameter(
                "ratio",
                &format!("{ratio:?}"),
                &"must be a positive ordered range",
            ));
        }
        Ok(Self { size, scale, ratio })
    }

    /// Output side length
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Sample a crop box for an image of the given dimensions
    ///
    /// Up to ten candidate boxes are drawn; if none fits, the largest
    /// centred box within the ratio range is used.
    pub fn sample<R: Rng + ?Sized>(&self, width: u32, height: u32, rng: &mut R) -> CropBox {
        let area = f64::from(width) * f64::from(height);
        let log_ratio = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..CROP_ATTEMPTS {
            let target_area = area * rng.random_range(self.scale.0..=self.scale.1);
            let aspect = rng.random_range(log_ratio.0..=log_ratio.1).exp();
            let crop_w = (target_area * aspect).sqrt().round();
            let crop_h = (target_area / aspect).sqrt().round();

            if crop_w >= 1.0
                && crop_h >= 1.0
                && crop_w <= f64::from(width)
                && crop_h <= f64::from(height)
            {
                let crop_w = crop_w as u32;
                let crop_h = crop_h as u32;
                return CropBox {
                    x: rng.random_range(0..=width - crop_w),
                    y: rng.random_range(0..=height - crop_h),
                    width: crop_w,
                    height: crop_h,
                };
            }
        }

        self.center_box(width, height)
    }

    fn center_box(&self, width: u32, height: u32) -> CropBox {
        let in_ratio = f64::from(width) / f64::from(height.max(1));
        let (crop_w, crop_h) = if in_ratio < self.ratio.0 {
            (width, ((f64::from(width) / self.ratio.0).round() as u32).clamp(1, height.max(1)))
        } else if in_ratio > self.ratio.1 {
            (((f64::from(height) * self.ratio.1).round() as u32).clamp(1, width.max(1)), height)
        } else {
            (width, height)
        };
        CropBox {
            x: width.saturating_sub(crop_w) / 2,
            y: height.saturating_sub(crop_h) / 2,
            width: crop_w,
            height: crop_h,
        }
    }

    /// Cut `crop_box` out of `image` and resize it bilinearly to the output size
    pub fn apply(&self, image: &GrayImage, crop_box: CropBox) -> GrayImage {
        let cropped = imageops::crop_imm(
            image,
            crop_box.x,
            crop_box.y,
            crop_box.width,
            crop_box.height,
        )
        .to_image();
        imageops::resize(&cropped, self.size, self.size, imageops::FilterType::Triangle)
    }
}
