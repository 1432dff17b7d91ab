//! Terminal progress bar per training epoch

use crate::gan::engine::StepLosses;
use crate::io::configuration::PROGRESS_BAR_WIDTH;
use crate::train::metrics::EpochSummary;
use crate::train::observer::TrainingObserver;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::LazyLock;

static EPOCH_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{prefix}} [{{bar:{PROGRESS_BAR_WIDTH}.cyan/blue}}] {{pos}}/{{len}} {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
});

static RUN_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] Epochs: [{bar:40.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
});

/// Shows overall epoch progress and a bar for the current epoch's batches
pub struct ProgressReporter {
    multi_progress: MultiProgress,
    run_bar: Option<ProgressBar>,
    epoch_bar: Option<ProgressBar>,
    batches: usize,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    /// Create a reporter with no bars yet
    pub fn new() -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            run_bar: None,
            epoch_bar: None,
            batches: 0,
        }
    }
}

impl TrainingObserver for ProgressReporter {
    fn on_train_start(&mut self, start: usize, end: usize, batches: usize) {
        self.batches = batches;
        let run_bar = ProgressBar::new(end.saturating_sub(start) as u64);
        run_bar.set_style(RUN_STYLE.clone());
        self.run_bar = Some(self.multi_progress.add(run_bar));
    }

    fn on_epoch_start(&mut self, epoch: usize, learning_rate: f32) {
        let bar = ProgressBar::new(self.batches as u64);
        bar.set_style(EPOCH_STYLE.clone());
        bar.set_prefix(format!("epoch {epoch}"));
        bar.set_message(format!("lr {learning_rate:.2e}"));
        self.epoch_bar = Some(self.multi_progress.add(bar));
    }

    fn on_batch_end(&mut self, _epoch: usize, _batch: usize, losses: &StepLosses) {
        if let Some(ref bar) = self.epoch_bar {
            bar.inc(1);
            bar.set_message(format!(
                "W {:+.4} G {:.4}",
                losses.wasserstein(),
                losses.generator_total()
            ));
        }
    }

    fn on_epoch_end(&mut self, _summary: &EpochSummary) {
        if let Some(bar) = self.epoch_bar.take() {
            bar.finish_and_clear();
            self.multi_progress.remove(&bar);
        }
        if let Some(ref run_bar) = self.run_bar {
            run_bar.inc(1);
        }
    }

    fn on_train_end(&mut self, _epochs: usize) {
        if let Some(ref run_bar) = self.run_bar {
            run_bar.finish_with_message("training finished");
        }
        let _ = self.multi_progress.clear();
    }
}
