//! Probability distributions used for hint sampling

use crate::io::error::{Result, invalid_parameter};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Below this acceptance rate rejection sampling is replaced by inversion
const MIN_REJECTION_ACCEPTANCE: f64 = 0.01;

/// Bisection steps used when inverting the normal CDF
const QUANTILE_ITERATIONS: usize = 100;

/// Error function approximation using Abramowitz and Stegun method
///
/// Absolute error is below 1.5e-7, sufficient for truncation bookkeeping.
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254_829_592_f64;
    let a2 = -0.284_496_736_f64;
    let a3 = 1.421_413_741_f64;
    let a4 = -1.453_152_027_f64;
    let a5 = 1.061_405_429_f64;
    let p = 0.327_591_1_f64;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / p.mul_add(x, 1.0);
    let y = (((((a5.mul_add(t, a4)).mul_add(t, a3)).mul_add(t, a2)).mul_add(t, a1)) * t)
        .mul_add(-(-x * x).exp(), 1.0);

    sign * y
}

/// Cumulative distribution function of the standard normal distribution
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Inverse of [`standard_normal_cdf`] by bisection, clamped to ±40
pub fn standard_normal_quantile(p: f64) -> f64 {
    let mut low = -40.0_f64;
    let mut high = 40.0_f64;
    for _ in 0..QUANTILE_ITERATIONS {
        let mid = f64::midpoint(low, high);
        if standard_normal_cdf(mid) < p {
            low = mid;
        } else {
            high = mid;
        }
    }
    f64::midpoint(low, high)
}

/// Normal distribution restricted to a closed interval
///
/// Matches the `truncnorm` parameterisation: location and scale of the
/// untruncated normal plus absolute bounds.
#[derive(Debug, Clone, Copy)]
pub struct TruncatedNormal {
    mean: f64,
    std_dev: f64,
    low: f64,
    high: f64,
    normal: Normal<f64>,
    cdf_low: f64,
    cdf_high: f64,
}

impl TruncatedNormal {
    /// Create a truncated normal distribution
    ///
    /// # Errors
    ///
    /// Returns an error if the standard deviation is not positive and finite,
    /// or if `low >= high`
    pub fn new(mean: f64, std_dev: f64, low: f64, high: f64) -> Result<Self> {
        if !(std_dev.is_finite() && std_dev > 0.0) {
            return Err(invalid_parameter(
                "std_dev",
                &std_dev,
                &"must be positive and finite",
            ));
        }
        if low.partial_cmp(&high) != Some(std::cmp::Ordering::Less) {
            return Err(invalid_parameter(
                "bounds",
                &format!("[{low}, {high}]"),
                &"lower bound must be below upper bound",
            ));
        }
        let normal = Normal::new(mean, std_dev)
            .map_err(|e| invalid_parameter("std_dev", &std_dev, &e))?;

        Ok(Self {
            mean,
            std_dev,
            low,
            high,
            normal,
            cdf_low: standard_normal_cdf((low - mean) / std_dev),
            cdf_high: standard_normal_cdf((high - mean) / std_dev),
        })
    }

    /// Lower truncation bound
    pub const fn low(&self) -> f64 {
        self.low
    }

    /// Upper truncation bound
    pub const fn high(&self) -> f64 {
        self.high
    }

    /// Probability mass of the untruncated normal inside the bounds
    pub fn acceptance(&self) -> f64 {
        self.cdf_high - self.cdf_low
    }

    fn sample_by_inversion<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u = rng.random::<f64>();
        let p = u.mul_add(self.cdf_high - self.cdf_low, self.cdf_low);
        let z = standard_normal_quantile(p);
        self.std_dev
            .mul_add(z, self.mean)
            .clamp(self.low, self.high)
    }
}

impl Distribution<f64> for TruncatedNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.acceptance() < MIN_REJECTION_ACCEPTANCE {
            return self.sample_by_inversion(rng);
        }
        // Expected attempts are 1 / acceptance, so this bound is never reached in practice
        let max_attempts = (100.0 / self.acceptance()).ceil() as usize;
        for _ in 0..max_attempts {
            let candidate = self.normal.sample(rng);
            if (self.low..=self.high).contains(&candidate) {
                return candidate;
            }
        }
        self.sample_by_inversion(rng)
    }
}
