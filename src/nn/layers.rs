//! Differentiable building blocks over (batch, channels, height, width) tensors

use crate::autodiff::Var;
use crate::io::error::{Result, invalid_parameter, shape_mismatch};

/// Dimensions of a rank-4 image tensor
///
/// # Errors
///
/// Returns an error if the tensor is not rank 4
pub fn dims4(x: &Var) -> Result<[usize; 4]> {
    match *x.shape() {
        [b, c, h, w] => Ok([b, c, h, w]),
        _ => Err(shape_mismatch("image tensor", &[0, 0, 0, 0], x.shape())),
    }
}

/// Integer ratio between two spatial sizes
///
/// # Errors
///
/// Returns an error if `large` is not a positive multiple of `small`
pub fn scale_factor(large: usize, small: usize) -> Result<usize> {
    if small == 0 || large % small != 0 {
        return Err(invalid_parameter(
            "spatial size",
            &format!("{large}/{small}"),
            &"sizes must divide evenly",
        ));
    }
    Ok(large / small)
}

/// Average pooling over non-overlapping `factor`×`factor` windows
///
/// # Errors
///
/// Returns an error if the spatial size is not divisible by `factor`
pub fn avg_pool(x: &Var, factor: usize) -> Result<Var> {
    let [b, c, h, w] = dims4(x)?;
    if factor == 0 || h % factor != 0 || w % factor != 0 {
        return Err(shape_mismatch(
            "avg_pool",
            &[b, c, h - h % factor.max(1), w - w % factor.max(1)],
            x.shape(),
        ));
    }
    let (ph, pw) = (h / factor, w / factor);
    x.reshape(&[b, c, ph, factor, pw, factor])?
        .sum_axis(5)?
        .sum_axis(3)
        .map(|pooled| pooled.scale(1.0 / (factor * factor) as f32))
}

/// Nearest-neighbour upsampling by an integer factor
///
/// # Errors
///
/// Returns an error if `x` is not rank 4
pub fn upsample_nearest(x: &Var, factor: usize) -> Result<Var> {
    let [b, c, h, w] = dims4(x)?;
    if factor == 1 {
        return Ok(x.clone());
    }
    x.reshape(&[b, c, h, 1, w, 1])?
        .broadcast_to(&[b, c, h, factor, w, factor])?
        .reshape(&[b, c, h * factor, w * factor])
}

/// Flatten pixels into rows: (B, C, H, W) → (B·H·W, C)
///
/// # Errors
///
/// Returns an error if `x` is not rank 4
pub fn to_rows(x: &Var) -> Result<Var> {
    let [b, c, h, w] = dims4(x)?;
    x.permute(&[0, 2, 3, 1])?.reshape(&[b * h * w, c])
}

/// Inverse of [`to_rows`]: (B·H·W, C) → (B, C, H, W)
///
/// # Errors
///
/// Returns an error if the row count does not equal `b·h·w`
pub fn from_rows(rows: &Var, b: usize, h: usize, w: usize) -> Result<Var> {
    let channels = rows.shape().get(1).copied().unwrap_or(0);
    rows.reshape(&[b, h, w, channels])?.permute(&[0, 3, 1, 2])
}

/// Per-pixel linear map (a 1×1 convolution without bias) returning rows
///
/// # Errors
///
/// Returns an error if the weight's input size differs from the channel count
pub fn pointwise(x: &Var, weight: &Var) -> Result<Var> {
    to_rows(x)?.matmul(weight)
}

/// Add a per-column bias to a row matrix
///
/// # Errors
///
/// Returns an error if the bias length differs from the column count
pub fn add_bias(rows: &Var, bias: &Var) -> Result<Var> {
    rows.add(&bias.broadcast_to(rows.shape())?)
}
