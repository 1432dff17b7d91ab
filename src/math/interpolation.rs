//! Bilinear interpolation on single-channel images
//!
//! Pixel centres sit at integer coordinates; samples whose four neighbours
//! are not all inside the image are rejected rather than padded.

use image::GrayImage;

/// Tolerance applied when deciding whether a coordinate lies on the image edge
const EDGE_TOLERANCE: f64 = 1e-6;

/// Bilinearly sample `image` at the continuous coordinate (`x`, `y`)
///
/// Returns `None` when the coordinate falls outside the convex hull of the
/// pixel centres, so callers never see synthesised border values.
pub fn bilinear(image: &GrayImage, x: f64, y: f64) -> Option<f64> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = f64::from(width - 1);
    let max_y = f64::from(height - 1);

    if x < -EDGE_TOLERANCE
        || y < -EDGE_TOLERANCE
        || x > max_x + EDGE_TOLERANCE
        || y > max_y + EDGE_TOLERANCE
    {
        return None;
    }

    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);
    let fx = x - x0;
    let fy = y - y0;

    let sample = |px: f64, py: f64| -> Option<f64> {
        image
            .get_pixel_checked(px as u32, py as u32)
            .map(|p| f64::from(p.0[0]))
    };

    let top = fx.mul_add(sample(x1, y0)? - sample(x0, y0)?, sample(x0, y0)?);
    let bottom = fx.mul_add(sample(x1, y1)? - sample(x0, y1)?, sample(x0, y1)?);

    Some(fy.mul_add(bottom - top, top))
}
