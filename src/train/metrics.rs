//! Running loss averages

use crate::gan::engine::StepLosses;

/// Sums step losses to report epoch means
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossAccumulator {
    sums: StepLosses,
    count: usize,
}

impl LossAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one step
    pub fn add(&mut self, losses: &StepLosses) {
        self.sums.critic_fake += losses.critic_fake;
        self.sums.critic_real += losses.critic_real;
        self.sums.gradient_penalty += losses.gradient_penalty;
        self.sums.adversarial += losses.adversarial;
        self.sums.content += losses.content;
        self.sums.l1 += losses.l1;
        self.count += 1;
    }

    /// Steps recorded
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Mean of every loss, or `None` before the first step
    pub fn mean(&self) -> Option<StepLosses> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f32;
        Some(StepLosses {
            critic_fake: self.sums.critic_fake / n,
            critic_real: self.sums.critic_real / n,
            gradient_penalty: self.sums.gradient_penalty / n,
            adversarial: self.sums.adversarial / n,
            content: self.sums.content / n,
            l1: self.sums.l1 / n,
        })
    }
}

/// Outcome of one training epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    /// Epoch number
    pub epoch: usize,
    /// Batches trained
    pub batches: usize,
    /// Mean losses over the epoch
    pub mean: StepLosses,
    /// Learning rate used during the epoch
    pub learning_rate: f32,
}

/// Sample-weighted mean of per-batch evaluation errors
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedMean {
    sum: f64,
    weight: usize,
}

impl WeightedMean {
    /// Record `value` for `weight` samples
    pub fn add(&mut self, value: f32, weight: usize) {
        self.sum += f64::from(value) * weight as f64;
        self.weight += weight;
    }

    /// Mean so far, or `None` with no samples
    pub fn mean(&self) -> Option<f32> {
        (self.weight > 0).then(|| (self.sum / self.weight as f64) as f32)
    }
}
