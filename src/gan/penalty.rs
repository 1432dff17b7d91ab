//! Gradient penalty on random interpolates between real and generated images

use crate::autodiff::{Var, grad};
use crate::io::error::{Result, TrainingError, shape_mismatch};
use crate::nn::network::Critic;
use ndarray::{ArrayD, IxDyn, Zip};
use rand::Rng;

/// Offset under the square root of the gradient norm
const NORM_EPSILON: f32 = 1e-12;

/// Penalty at interpolates `α·real + (1-α)·fake` with one `α ~ U(0, 1)` per sample
///
/// `real` and `fake` are read as values; no gradient flows back into them.
///
/// # Errors
///
/// Returns `ShapeMismatch` if `real` and `fake` differ in shape,
/// `NotDifferentiable` if the critic score does not depend on its input
pub fn gradient_penalty<C: Critic + ?Sized, R: Rng + ?Sized>(
    critic: &C,
    real: &Var,
    fake: &Var,
    condition: &Var,
    coefficient: f32,
    rng: &mut R,
) -> Result<Var> {
    if real.shape() != fake.shape() {
        return Err(shape_mismatch("gradient penalty", real.shape(), fake.shape()));
    }
    let batch = real.shape().first().copied().unwrap_or(0);
    let alphas: Vec<f32> = (0..batch).map(|_| rng.random::<f32>()).collect();

    let interpolate = interpolate(real.value(), fake.value(), &alphas)?;
    gradient_penalty_at(critic, &Var::leaf(interpolate, true), condition, coefficient)
}

/// Penalty `coefficient · mean_b((‖∇_b‖₂ - 1)²)` at a given interpolate
///
/// The gradient of the summed critic score with respect to `interpolate` is
/// built with its own graph, so the returned penalty can be differentiated
/// with respect to the critic parameters. An untracked `interpolate` is
/// replaced by a tracked leaf holding the same value.
///
/// # Errors
///
/// Returns `NotDifferentiable` if the critic score does not depend on the interpolate
pub fn gradient_penalty_at<C: Critic + ?Sized>(
    critic: &C,
    interpolate: &Var,
    condition: &Var,
    coefficient: f32,
) -> Result<Var> {
    let input = if interpolate.requires_grad() {
        interpolate.clone()
    } else {
        Var::leaf(interpolate.value().clone(), true)
    };
    let batch = input.shape().first().copied().unwrap_or(0);

    let score = critic.forward(&input, condition)?.sum()?;
    let gradient = grad(&score, &[&input], true)?
        .into_iter()
        .next()
        .flatten()
        .ok_or(TrainingError::NotDifferentiable {
            operation: "gradient penalty",
        })?;

    let per_sample = input.value().len() / batch.max(1);
    let norms = gradient
        .reshape(&[batch, per_sample])?
        .square()
        .sum_axis(1)?
        .add_scalar(NORM_EPSILON)
        .sqrt();

    Ok(norms.add_scalar(-1.0).square().mean()?.scale(coefficient))
}

fn interpolate(real: &ArrayD<f32>, fake: &ArrayD<f32>, alphas: &[f32]) -> Result<ArrayD<f32>> {
    let mut blend_shape = vec![1; real.ndim()];
    if let Some(first) = blend_shape.first_mut() {
        *first = alphas.len();
    }
    let alpha = ArrayD::from_shape_vec(IxDyn(&blend_shape), alphas.to_vec())
        .map_err(|_| shape_mismatch("gradient penalty", &blend_shape, &[alphas.len()]))?;
    let alpha = alpha
        .broadcast(real.raw_dim())
        .ok_or_else(|| shape_mismatch("gradient penalty", real.shape(), &blend_shape))?;

    let mut mixed = ArrayD::zeros(real.raw_dim());
    Zip::from(&mut mixed)
        .and(real)
        .and(fake)
        .and(&alpha)
        .for_each(|out, &r, &f, &a| *out = a * r + (1.0 - a) * f);
    Ok(mixed)
}
