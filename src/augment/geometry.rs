//! Border-free rotation and flipping of grayscale images

use crate::io::error::{Result, computation_error, invalid_parameter};
use crate::math::interpolation::bilinear;
use image::{GrayImage, Luma, imageops};

/// Below this difference between |sin| and |cos| the angle is treated as 45°
const DIAGONAL_TOLERANCE: f64 = 1e-10;

/// Slack absorbing rounding error before crop extents are floored to whole pixels
const EXTENT_SLACK: f64 = 1e-9;

/// Dimensions of the largest axis-aligned rectangle inside a rotated `width`×`height` rectangle
///
/// Both rectangles share their centre. The result depends only on the
/// arguments and is symmetric under `angle -> angle + π`.
pub fn largest_rotated_rect(width: f64, height: f64, angle: f64) -> (f64, f64) {
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    let width_is_longer = width >= height;
    let (long_side, short_side) = if width_is_longer {
        (width, height)
    } else {
        (height, width)
    };
    let sin_a = angle.sin().abs();
    let cos_a = angle.cos().abs();

    // Half-constrained case: two crop corners touch the longer sides
    if short_side <= 2.0 * sin_a * cos_a * long_side
        || (sin_a - cos_a).abs() < DIAGONAL_TOLERANCE
    {
        let half = 0.5 * short_side;
        return if width_is_longer {
            (half / sin_a, half / cos_a)
        } else {
            (half / cos_a, half / sin_a)
        };
    }

    // Fully constrained case: all four crop corners touch the rotated sides
    let cos_2a = cos_a.mul_add(cos_a, -(sin_a * sin_a));
    (
        width.mul_add(cos_a, -(height * sin_a)) / cos_2a,
        height.mul_add(cos_a, -(width * sin_a)) / cos_2a,
    )
}

/// Size of the canvas holding the whole image rotated by `angle`
pub fn rotated_bounds(width: f64, height: f64, angle: f64) -> (f64, f64) {
    let sin_a = angle.sin().abs();
    let cos_a = angle.cos().abs();
    (
        width.mul_add(cos_a, height * sin_a),
        width.mul_add(sin_a, height * cos_a),
    )
}

/// Pixel size of the crop taken by [`rotate_crop_max`]
///
/// The rectangle is fitted to the hull of pixel centres, so every output
/// pixel is interpolated from four genuine source pixels.
pub fn rotate_crop_size(width: u32, height: u32, angle_degrees: f64) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let (crop_w, crop_h) = largest_rotated_rect(
        f64::from(width - 1),
        f64::from(height - 1),
        angle_degrees.to_radians(),
    );
    let to_pixels = |extent: f64, limit: u32| -> u32 {
        if extent.is_finite() && extent >= 0.0 {
            ((extent + EXTENT_SLACK).floor() as u32).saturating_add(1).min(limit.max(1))
        } else {
            1
        }
    };
    let (bound_w, bound_h) = rotated_bounds(f64::from(width), f64::from(height), angle_degrees.to_radians());
    (
        to_pixels(crop_w, bound_w.ceil() as u32),
        to_pixels(crop_h, bound_h.ceil() as u32),
    )
}

/// Rotate counter-clockwise by `angle_degrees` about the centre and keep the
/// largest axis-aligned crop that contains no padding
///
/// # Errors
///
/// Returns an error if the image is empty
pub fn rotate_crop_max(image: &GrayImage, angle_degrees: f64) -> Result<GrayImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(invalid_parameter(
            "image",
            &format!("{width}x{height}"),
            &"must not be empty",
        ));
    }
    let (crop_w, crop_h) = rotate_crop_size(width, height, angle_degrees);

    let theta = angle_degrees.to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    let source_cx = f64::from(width - 1) / 2.0;
    let source_cy = f64::from(height - 1) / 2.0;
    let crop_cx = f64::from(crop_w - 1) / 2.0;
    let crop_cy = f64::from(crop_h - 1) / 2.0;

    let mut output = GrayImage::new(crop_w, crop_h);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let dx = f64::from(x) - crop_cx;
        let dy = f64::from(y) - crop_cy;
        // Inverse rotation in image coordinates, where y points down
        let sx = cos_t.mul_add(dx, -(sin_t * dy)) + source_cx;
        let sy = sin_t.mul_add(dx, cos_t * dy) + source_cy;
        let value = bilinear(image, sx, sy).ok_or_else(|| {
            computation_error(
                "rotate_crop_max",
                &format!("({sx:.3}, {sy:.3}) falls outside the source"),
            )
        })?;
        *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    Ok(output)
}

/// Mirror an image left to right
pub fn flip_horizontal(image: &GrayImage) -> GrayImage {
    imageops::flip_horizontal(image)
}
