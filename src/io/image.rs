//! Conversions between images on disk and normalised (channels, height, width) tensors

use crate::io::error::{Result, TrainingError, shape_mismatch};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage, imageops};
use ndarray::{Array3, ArrayD, ArrayView3, Ix3};
use std::path::Path;

/// Map an 8-bit intensity to [-1, 1]
pub fn normalize_intensity(value: u8) -> f32 {
    f32::from(value) / 127.5 - 1.0
}

/// Map a value in [-1, 1] back to an 8-bit intensity, clamping outliers
pub fn denormalize_intensity(value: f32) -> u8 {
    ((value + 1.0) * 127.5).round().clamp(0.0, 255.0) as u8
}

fn to_tensor<P>(image: &ImageBuffer<P, Vec<u8>>) -> ArrayD<f32>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let channels = usize::from(P::CHANNEL_COUNT);
    let mut tensor = Array3::<f32>::zeros((channels, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for (c, &value) in pixel.channels().iter().enumerate() {
            if let Some(slot) = tensor.get_mut((c, y as usize, x as usize)) {
                *slot = normalize_intensity(value);
            }
        }
    }
    tensor.into_dyn()
}

/// Grayscale image as a normalised (1, H, W) tensor
pub fn gray_to_tensor(image: &GrayImage) -> ArrayD<f32> {
    to_tensor(image)
}

/// RGB image as a normalised (3, H, W) tensor
pub fn rgb_to_tensor(image: &RgbImage) -> ArrayD<f32> {
    to_tensor(image)
}

fn as_chw(tensor: &ArrayD<f32>) -> Result<ArrayView3<'_, f32>> {
    tensor
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| shape_mismatch("image tensor", &[0, 0, 0], tensor.shape()))
}

fn intensity(value: f32, unnormalize: bool) -> u8 {
    if unnormalize {
        denormalize_intensity(value)
    } else {
        (value * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

/// Render the first channel of a (C, H, W) tensor
///
/// With `unnormalize` values are mapped from [-1, 1]; otherwise from [0, 1],
/// which suits masks.
///
/// # Errors
///
/// Returns an error if the tensor is not rank 3 or has no channels
pub fn tensor_to_gray(tensor: &ArrayD<f32>, unnormalize: bool) -> Result<GrayImage> {
    let view = as_chw(tensor)?;
    let (channels, height, width) = view.dim();
    if channels == 0 {
        return Err(shape_mismatch("gray image", &[1, height, width], tensor.shape()));
    }
    Ok(GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let value = view.get((0, y as usize, x as usize)).copied().unwrap_or(-1.0);
        Luma([intensity(value, unnormalize)])
    }))
}

/// Render a (3, H, W) tensor, or replicate a (1, H, W) tensor to grey RGB
///
/// # Errors
///
/// Returns an error if the tensor is not rank 3 with one or three channels
pub fn tensor_to_rgb(tensor: &ArrayD<f32>, unnormalize: bool) -> Result<RgbImage> {
    let view = as_chw(tensor)?;
    let (channels, height, width) = view.dim();
    if channels != 1 && channels != 3 {
        return Err(shape_mismatch("rgb image", &[3, height, width], tensor.shape()));
    }
    Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let channel = |c: usize| {
            let c = c.min(channels - 1);
            intensity(
                view.get((c, y as usize, x as usize)).copied().unwrap_or(-1.0),
                unnormalize,
            )
        };
        Rgb([channel(0), channel(1), channel(2)])
    }))
}

/// Open an image from disk
///
/// # Errors
///
/// Returns `ImageLoad` with the path if the file cannot be decoded
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| TrainingError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Split a side-by-side pair into its left and right halves
///
/// # Errors
///
/// Returns `InvalidDataset` if the width is not a positive even number
pub fn split_side_by_side(image: &GrayImage) -> Result<(GrayImage, GrayImage)> {
    let (width, height) = image.dimensions();
    if width == 0 || width % 2 != 0 || height == 0 {
        return Err(TrainingError::InvalidDataset {
            reason: format!("side-by-side pair has odd or empty size {width}x{height}"),
        });
    }
    let half = width / 2;
    Ok((
        imageops::crop_imm(image, 0, 0, half, height).to_image(),
        imageops::crop_imm(image, half, 0, half, height).to_image(),
    ))
}

/// Resize to a `size`×`size` square with bilinear filtering
pub fn resize_square<P>(image: &ImageBuffer<P, Vec<u8>>, size: u32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    imageops::resize(image, size, size, imageops::FilterType::Triangle)
}

/// Write an image, creating parent directories first
///
/// # Errors
///
/// Returns `FileSystem` if a directory cannot be created and `ImageExport`
/// if encoding or writing fails
pub fn save_image(image: &DynamicImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TrainingError::FileSystem {
            path: parent.to_path_buf(),
            operation: "create directory",
            source: e,
        })?;
    }
    image.save(path).map_err(|source| TrainingError::ImageExport {
        path: path.to_path_buf(),
        source,
    })
}

/// Convert a (C, H, W) tensor to an image, keeping one or three channels
///
/// # Errors
///
/// Returns an error if the tensor is not rank 3 with one or three channels
pub fn tensor_to_image(tensor: &ArrayD<f32>, unnormalize: bool) -> Result<DynamicImage> {
    match tensor.shape().first() {
        Some(1) => Ok(DynamicImage::ImageLuma8(tensor_to_gray(tensor, unnormalize)?)),
        Some(3) => Ok(DynamicImage::ImageRgb8(tensor_to_rgb(tensor, unnormalize)?)),
        _ => Err(shape_mismatch("image tensor", &[3, 0, 0], tensor.shape())),
    }
}
