//! Sample strips for evaluation and inference output

use crate::io::error::{Result, shape_mismatch};
use crate::io::image::{save_image, tensor_to_gray, tensor_to_image, tensor_to_rgb};
use image::{DynamicImage, RgbImage, imageops};
use ndarray::ArrayD;
use std::path::Path;
use tracing::debug;

/// One image of a sample strip
#[derive(Debug, Clone)]
pub struct Panel {
    /// (C, H, W) tensor
    pub tensor: ArrayD<f32>,
    /// Caption
    pub title: String,
    /// Map values from [-1, 1] rather than [0, 1]
    pub unnormalize: bool,
    /// Render only the first channel
    pub grayscale: bool,
}

impl Panel {
    /// Panel of a normalised image
    pub fn image(tensor: ArrayD<f32>, title: impl Into<String>, grayscale: bool) -> Self {
        Self {
            tensor,
            title: title.into(),
            unnormalize: true,
            grayscale,
        }
    }

    /// Panel of a {0, 1} mask
    pub fn mask(tensor: ArrayD<f32>, title: impl Into<String>) -> Self {
        Self {
            tensor,
            title: title.into(),
            unnormalize: false,
            grayscale: true,
        }
    }

    fn render(&self) -> Result<RgbImage> {
        if self.grayscale {
            Ok(DynamicImage::ImageLuma8(tensor_to_gray(&self.tensor, self.unnormalize)?).to_rgb8())
        } else {
            tensor_to_rgb(&self.tensor, self.unnormalize)
        }
    }
}

/// Receives sample panels and writes them somewhere
pub trait SampleSink {
    /// Write `panels` to `destination`
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing fails
    fn render(&mut self, panels: &[Panel], destination: &Path) -> Result<()>;
}

/// Lays panels out left to right in one PNG
///
/// Panels are scaled to the tallest panel's height with nearest-neighbour
/// filtering, so low-resolution masks stay legible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngStripSink {
    spacing: u32,
}

impl Default for PngStripSink {
    fn default() -> Self {
        Self { spacing: 4 }
    }
}

impl PngStripSink {
    /// Sink with `spacing` white pixels between panels
    pub const fn new(spacing: u32) -> Self {
        Self { spacing }
    }
}

impl SampleSink for PngStripSink {
    fn render(&mut self, panels: &[Panel], destination: &Path) -> Result<()> {
        let rendered = panels
            .iter()
            .map(Panel::render)
            .collect::<Result<Vec<_>>>()?;
        let height = rendered.iter().map(RgbImage::height).max().unwrap_or(0);
        if height == 0 {
            return Err(shape_mismatch("sample strip", &[1], &[0]));
        }

        let scaled: Vec<RgbImage> = rendered
            .into_iter()
            .map(|image| {
                if image.height() == height {
                    image
                } else {
                    let width = (u64::from(image.width()) * u64::from(height)
                        / u64::from(image.height().max(1))) as u32;
                    imageops::resize(&image, width.max(1), height, imageops::FilterType::Nearest)
                }
            })
            .collect();

        let gaps = self.spacing * u32::try_from(scaled.len().saturating_sub(1)).unwrap_or(0);
        let width = scaled.iter().map(RgbImage::width).sum::<u32>() + gaps;
        let mut strip = RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        let mut offset = 0;
        for image in &scaled {
            imageops::replace(&mut strip, image, i64::from(offset), 0);
            offset += image.width() + self.spacing;
        }

        let titles: Vec<&str> = panels.iter().map(|p| p.title.as_str()).collect();
        debug!(path = %destination.display(), ?titles, "writing sample strip");
        save_image(&DynamicImage::ImageRgb8(strip), destination)
    }
}

/// Write a single normalised tensor as an image without any layout
///
/// # Errors
///
/// Returns an error if the tensor is not a one- or three-channel image or
/// the file cannot be written
pub fn save_raw(tensor: &ArrayD<f32>, destination: &Path) -> Result<()> {
    save_image(&tensor_to_image(tensor, true)?, destination)
}
