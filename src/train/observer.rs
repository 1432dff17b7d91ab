//! Fixed points at which the training loop reports to observers

use crate::gan::engine::StepLosses;
use crate::io::error::TrainingError;
use crate::train::metrics::EpochSummary;
use std::path::Path;
use tracing::{debug, info, warn};

/// Receives training events; every method defaults to doing nothing
pub trait TrainingObserver {
    /// Training is about to run epochs `start..end` of `batches` batches each
    fn on_train_start(&mut self, _start: usize, _end: usize, _batches: usize) {}

    /// An epoch begins with the given generator learning rate
    fn on_epoch_start(&mut self, _epoch: usize, _learning_rate: f32) {}

    /// A batch finished training
    fn on_batch_end(&mut self, _epoch: usize, _batch: usize, _losses: &StepLosses) {}

    /// An epoch finished training
    fn on_epoch_end(&mut self, _summary: &EpochSummary) {}

    /// Evaluation after `epoch` produced a mean L1 error
    fn on_evaluation(&mut self, _epoch: usize, _l1: f32) {}

    /// Evaluation after `epoch` failed; training continues
    fn on_evaluation_failed(&mut self, _epoch: usize, _error: &TrainingError) {}

    /// A checkpoint for `epoch` was written
    fn on_checkpoint(&mut self, _epoch: usize, _path: &Path) {}

    /// Training finished after `epochs` epochs
    fn on_train_end(&mut self, _epochs: usize) {}
}

/// Reports events through `tracing`
#[derive(Debug, Clone, Copy)]
pub struct LoggingObserver {
    batch_log_freq: usize,
}

impl LoggingObserver {
    /// Log batch losses every `batch_log_freq` batches
    pub const fn new(batch_log_freq: usize) -> Self {
        Self {
            batch_log_freq: if batch_log_freq == 0 { 1 } else { batch_log_freq },
        }
    }
}

impl TrainingObserver for LoggingObserver {
    fn on_train_start(&mut self, start: usize, end: usize, batches: usize) {
        info!(start, end, batches, "training started");
    }

    fn on_epoch_start(&mut self, epoch: usize, learning_rate: f32) {
        debug!(epoch, learning_rate, "epoch started");
    }

    fn on_batch_end(&mut self, epoch: usize, batch: usize, losses: &StepLosses) {
        if (batch + 1) % self.batch_log_freq == 0 {
            info!(
                epoch,
                batch,
                wasserstein = losses.wasserstein(),
                penalty = losses.gradient_penalty,
                generator = losses.generator_total(),
                l1 = losses.l1,
                "batch"
            );
        }
    }

    fn on_epoch_end(&mut self, summary: &EpochSummary) {
        info!(
            epoch = summary.epoch,
            batches = summary.batches,
            wasserstein = summary.mean.wasserstein(),
            generator = summary.mean.generator_total(),
            content = summary.mean.content,
            l1 = summary.mean.l1,
            "epoch finished"
        );
    }

    fn on_evaluation(&mut self, epoch: usize, l1: f32) {
        info!(epoch, l1, "evaluation");
    }

    fn on_evaluation_failed(&mut self, epoch: usize, error: &TrainingError) {
        warn!(epoch, %error, "evaluation failed");
    }

    fn on_checkpoint(&mut self, epoch: usize, path: &Path) {
        debug!(epoch, path = %path.display(), "checkpoint written");
    }

    fn on_train_end(&mut self, epochs: usize) {
        info!(epochs, "training finished");
    }
}
