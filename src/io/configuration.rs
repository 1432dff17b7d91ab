//! Training constants and run configuration
//!
//! A run is described by one immutable [`TrainingConfig`], assembled from a
//! shared [`CommonTrainingFields`] block and a task-specific [`TaskConfig`].
//! The whole struct travels inside every checkpoint so a resumed run is
//! rebuilt from exactly the settings it was started with.

use crate::gan::mask::MaskPolicy;
use crate::io::error::{Result, TrainingError, WithContext, invalid_parameter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

// Hint masks live at a quarter of the image resolution
/// Ratio between image size and mask size
pub const MASK_DOWNSCALE: usize = 4;
/// Mean of the truncated normal hint inclusion probability
pub const HINT_PROBABILITY_MEAN: f64 = 1.0;
/// Standard deviation of the truncated normal hint inclusion probability
pub const HINT_PROBABILITY_STD: f64 = 0.01;

// Adversarial coefficients
/// Weight of the gradient penalty in the critic objective
pub const DEFAULT_GRADIENT_PENALTY_WEIGHT: f32 = 10.0;
/// Coefficient of the quadratic term bounding real scores
pub const DEFAULT_REAL_SCORE_STABILIZER: f32 = 1e-3;
/// Down-weighting of the adversarial term in the generator objective
pub const DEFAULT_ADVERSARIAL_WEIGHT: f32 = 1e-4;

// Optimizer defaults
/// Adam learning rate
pub const DEFAULT_LEARNING_RATE: f32 = 2e-4;
/// Adam first moment decay
pub const DEFAULT_BETA1: f32 = 0.5;
/// Adam second moment decay
pub const DEFAULT_BETA2: f32 = 0.999;
/// Adam denominator offset
pub const ADAM_EPSILON: f32 = 1e-8;
/// Epochs between learning rate decays
pub const DEFAULT_SCHEDULER_STEP_SIZE: usize = 50;
/// Learning rate multiplier applied at each decay
pub const DEFAULT_SCHEDULER_GAMMA: f32 = 0.1;

// Loop cadence
/// Fixed seed for reproducible runs
pub const DEFAULT_SEED: u64 = 42;
/// Samples per batch
pub const DEFAULT_BATCH_SIZE: usize = 4;
/// Training resolution in pixels
pub const DEFAULT_IMAGE_SIZE: usize = 256;
/// Epochs between evaluations
pub const DEFAULT_EVAL_FREQ: usize = 1;
/// Epochs between checkpoints
pub const DEFAULT_SAVE_FREQ: usize = 5;
/// Batches between loss log lines
pub const DEFAULT_BATCH_LOG_FREQ: usize = 50;
/// Evaluation samples rendered per evaluation
pub const DEFAULT_EVAL_SAMPLES: usize = 8;

// Augmentation
/// Lower bound of the random resized crop area fraction
pub const DEFAULT_CROP_SCALE_MIN: f64 = 0.3;
/// Upper bound of the random resized crop area fraction
pub const DEFAULT_CROP_SCALE_MAX: f64 = 1.0;
/// Attempts at sampling a crop box before falling back to a center crop
pub const CROP_ATTEMPTS: usize = 10;
/// Probability of replacing the source with the target
pub const DEFAULT_IDENTITY_PROBABILITY: f64 = 0.1;
/// Probability of a horizontal flip
pub const DEFAULT_FLIP_PROBABILITY: f64 = 0.5;
/// Largest rotation angle in degrees
pub const DEFAULT_MAX_ROTATION_DEGREES: u32 = 180;

// Reference networks
/// Hidden width of the generator and critic
pub const DEFAULT_HIDDEN_CHANNELS: usize = 32;

/// Scale applied to hints at inference time
pub const DEFAULT_HINT_MULTIPLIER: f32 = 1.0;

// Output settings
/// Prefix of checkpoint file names
pub const CHECKPOINT_PREFIX: &str = "epoch-";
/// Extension of checkpoint and weight files
pub const JSON_EXTENSION: &str = "json";
/// Suffix added to inferred image filenames
pub const OUTPUT_SUFFIX: &str = "_result";
/// Suffix of the input sketch saved next to an inferred image
pub const INPUT_SUFFIX: &str = "_input";
/// Suffix of the hint colours saved next to an inferred image
pub const HINT_SUFFIX: &str = "_hint";
/// Suffix of the target saved next to an inferred image
pub const TARGET_SUFFIX: &str = "_target";
/// Width of progress bars in characters
pub const PROGRESS_BAR_WIDTH: u16 = 40;

/// Fields shared by every task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommonTrainingFields {
    /// Identifier grouping the checkpoints of one run
    pub run_id: String,
    /// Seed from which every random stream of the run is derived
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Samples per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// First epoch to train
    #[serde(default)]
    pub start_epoch: usize,
    /// Epoch at which training stops (exclusive)
    pub end_epoch: usize,
    /// Epochs between evaluations
    #[serde(default = "default_eval_freq")]
    pub eval_freq: usize,
    /// Epochs between checkpoints
    #[serde(default = "default_save_freq")]
    pub save_freq: usize,
    /// Batches between loss log lines
    #[serde(default = "default_batch_log_freq")]
    pub batch_log_freq: usize,
    /// Initial Adam learning rate for both networks
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// Adam first moment decay
    #[serde(default = "default_beta1")]
    pub beta1: f32,
    /// Adam second moment decay
    #[serde(default = "default_beta2")]
    pub beta2: f32,
    /// Epochs between learning rate decays
    #[serde(default = "default_scheduler_step_size")]
    pub scheduler_step_size: usize,
    /// Learning rate multiplier applied at each decay
    #[serde(default = "default_scheduler_gamma")]
    pub scheduler_gamma: f32,
    /// Square training resolution in pixels
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    /// Hidden width of the reference generator and critic
    #[serde(default = "default_hidden_channels")]
    pub hidden_channels: usize,
    /// Directory holding the `train/` and `val/` splits
    pub dataset_root: PathBuf,
    /// Directory receiving `<run_id>/epoch-N.json` checkpoints
    pub checkpoint_dir: PathBuf,
    /// Directory receiving evaluation sample strips
    pub eval_output_dir: PathBuf,
    /// Evaluation samples rendered per evaluation
    #[serde(default = "default_eval_samples")]
    pub eval_samples: usize,
}

/// Geometric augmentation settings for sketch simplification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AugmentationConfig {
    /// Range of crop area as a fraction of the rotated image
    pub crop_scale: (f64, f64),
    /// Probability of an identity pair
    pub identity_probability: f64,
    /// Probability of a shared horizontal flip
    pub flip_probability: f64,
    /// Largest rotation angle in degrees
    pub max_rotation_degrees: u32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            crop_scale: (DEFAULT_CROP_SCALE_MIN, DEFAULT_CROP_SCALE_MAX),
            identity_probability: DEFAULT_IDENTITY_PROBABILITY,
            flip_probability: DEFAULT_FLIP_PROBABILITY,
            max_rotation_degrees: DEFAULT_MAX_ROTATION_DEGREES,
        }
    }
}

impl AugmentationConfig {
    /// Check ranges of every field
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        let (low, high) = self.crop_scale;
        if !(low > 0.0 && low <= high && high <= 1.0) {
            return Err(invalid_parameter(
                "crop_scale",
                &format!("({low}, {high})"),
                &"must satisfy 0 < min <= max <= 1",
            ));
        }
        for (name, probability) in [
            ("identity_probability", self.identity_probability),
            ("flip_probability", self.flip_probability),
        ] {
            if !(0.0..=1.0).contains(&probability) {
                return Err(invalid_parameter(name, &probability, &"must lie in [0, 1]"));
            }
        }
        if self.max_rotation_degrees > 360 {
            return Err(invalid_parameter(
                "max_rotation_degrees",
                &self.max_rotation_degrees,
                &"must not exceed 360",
            ));
        }
        Ok(())
    }
}

/// Task selection with task-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum TaskConfig {
    /// Reference-guided colorization of line art
    Colorization {
        /// Whether the generator receives hints
        use_hint: bool,
        /// Mask policy while training
        train_mask: MaskPolicy,
        /// Mask policy while evaluating
        eval_mask: MaskPolicy,
    },
    /// Cleanup of rough sketches
    SketchSimplification {
        /// Translate the left half into the right half when true
        a_to_b: bool,
        /// Geometric augmentation of training pairs
        #[serde(default)]
        augmentation: AugmentationConfig,
    },
}

impl TaskConfig {
    /// Channels of content and reference images
    pub const fn target_channels(&self) -> usize {
        match self {
            Self::Colorization { .. } => 3,
            Self::SketchSimplification { .. } => 1,
        }
    }

    /// Whether hints are built and passed to the generator
    pub const fn uses_hint(&self) -> bool {
        match self {
            Self::Colorization { use_hint, .. } => *use_hint,
            Self::SketchSimplification { .. } => false,
        }
    }

    /// Channels of the hint tensor, zero when hints are disabled
    pub const fn hint_channels(&self) -> usize {
        if self.uses_hint() {
            self.target_channels() + 1
        } else {
            0
        }
    }

    /// Mask policy applied to training batches
    pub const fn train_mask(&self) -> MaskPolicy {
        match self {
            Self::Colorization { train_mask, .. } => *train_mask,
            Self::SketchSimplification { .. } => MaskPolicy::None,
        }
    }

    /// Mask policy applied to evaluation batches
    pub const fn eval_mask(&self) -> MaskPolicy {
        match self {
            Self::Colorization { eval_mask, .. } => *eval_mask,
            Self::SketchSimplification { .. } => MaskPolicy::None,
        }
    }
}

/// Coefficients of the adversarial objectives
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdversarialConfig {
    /// Multiplier of the negated critic score in the generator loss
    pub adversarial_weight: f32,
    /// Coefficient of the squared real score in the critic loss
    pub real_score_stabilizer: f32,
    /// Multiplier of the gradient penalty
    pub gradient_penalty_weight: f32,
}

impl Default for AdversarialConfig {
    fn default() -> Self {
        Self {
            adversarial_weight: DEFAULT_ADVERSARIAL_WEIGHT,
            real_score_stabilizer: DEFAULT_REAL_SCORE_STABILIZER,
            gradient_penalty_weight: DEFAULT_GRADIENT_PENALTY_WEIGHT,
        }
    }
}

impl AdversarialConfig {
    /// Check that every coefficient is finite and non-negative
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` naming the first invalid coefficient
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("adversarial_weight", self.adversarial_weight),
            ("real_score_stabilizer", self.real_score_stabilizer),
            ("gradient_penalty_weight", self.gradient_penalty_weight),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid_parameter(name, &value, &"must be finite and non-negative"));
            }
        }
        Ok(())
    }
}

/// Paths of the frozen feature extractors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackboneConfig {
    /// Encoder conditioning generator and critic on the sketch
    pub sketch_encoder: PathBuf,
    /// Encoder used by the content loss on generated images
    pub content_encoder: PathBuf,
}

/// Complete immutable description of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    /// Fields shared by every task
    pub common: CommonTrainingFields,
    /// Task selection
    pub task: TaskConfig,
    /// Adversarial coefficients
    #[serde(default)]
    pub adversarial: AdversarialConfig,
    /// Frozen backbone weights
    pub backbones: BackboneConfig,
}

impl TrainingConfig {
    /// Read and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, malformed or invalid
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).with_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_path(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).with_path(path)?;
        writer.flush().with_path(path)?;
        Ok(())
    }

    /// Same run with a different exclusive final epoch
    ///
    /// A resumed run may be extended; every other setting must stay as it
    /// was written to the checkpoint.
    #[must_use]
    pub fn with_end_epoch(&self, end_epoch: usize) -> Self {
        let mut config = self.clone();
        config.common.end_epoch = end_epoch;
        config
    }

    /// Check every field for values the run cannot proceed with
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        let common = &self.common;
        if common.run_id.is_empty()
            || common
                .run_id
                .chars()
                .any(|c| std::path::is_separator(c) || c == '.')
        {
            return Err(invalid_parameter(
                "run_id",
                &common.run_id,
                &"must be a non-empty name without separators or dots",
            ));
        }
        if common.batch_size == 0 {
            return Err(invalid_parameter("batch_size", &common.batch_size, &"must be positive"));
        }
        if common.image_size == 0 || common.image_size % MASK_DOWNSCALE != 0 {
            return Err(invalid_parameter(
                "image_size",
                &common.image_size,
                &format!("must be a positive multiple of {MASK_DOWNSCALE}"),
            ));
        }
        if common.end_epoch <= common.start_epoch {
            return Err(invalid_parameter(
                "end_epoch",
                &common.end_epoch,
                &format!("must exceed start_epoch {}", common.start_epoch),
            ));
        }
        for (name, value) in [
            ("eval_freq", common.eval_freq),
            ("save_freq", common.save_freq),
            ("batch_log_freq", common.batch_log_freq),
            ("scheduler_step_size", common.scheduler_step_size),
            ("hidden_channels", common.hidden_channels),
        ] {
            if value == 0 {
                return Err(invalid_parameter(name, &value, &"must be positive"));
            }
        }
        if !(common.learning_rate.is_finite() && common.learning_rate > 0.0) {
            return Err(invalid_parameter(
                "learning_rate",
                &common.learning_rate,
                &"must be positive",
            ));
        }
        for (name, beta) in [("beta1", common.beta1), ("beta2", common.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(invalid_parameter(name, &beta, &"must lie in [0, 1)"));
            }
        }
        if !(common.scheduler_gamma > 0.0 && common.scheduler_gamma <= 1.0) {
            return Err(invalid_parameter(
                "scheduler_gamma",
                &common.scheduler_gamma,
                &"must lie in (0, 1]",
            ));
        }
        if let TaskConfig::SketchSimplification { augmentation, .. } = &self.task {
            augmentation.validate()?;
        }
        self.adversarial.validate()
    }

    /// Spatial size of hint masks for this run
    pub const fn mask_size(&self) -> usize {
        self.common.image_size / MASK_DOWNSCALE
    }
}

/// Settings of a standalone inference pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferenceConfig {
    /// Checkpoint holding the generator and the run configuration
    pub checkpoint: PathBuf,
    /// Directory of inputs laid out like the evaluation split
    pub input_dir: PathBuf,
    /// Directory receiving generated images
    pub output_dir: PathBuf,
    /// Expose every hint location when true, none otherwise
    #[serde(default)]
    pub hint_mask: bool,
    /// Scale applied to hints before they reach the generator
    #[serde(default = "default_hint_multiplier")]
    pub hint_multiplier: f32,
    /// Seed for mask sampling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl InferenceConfig {
    /// Read and validate an inference configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, malformed or invalid
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).with_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the hint multiplier
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the multiplier is not finite
    pub fn validate(&self) -> Result<()> {
        if !self.hint_multiplier.is_finite() {
            return Err(invalid_parameter(
                "hint_multiplier",
                &self.hint_multiplier,
                &"must be finite",
            ));
        }
        if self.input_dir == self.output_dir {
            return Err(TrainingError::InvalidDataset {
                reason: format!(
                    "output directory '{}' would overwrite the inputs",
                    self.output_dir.display()
                ),
            });
        }
        Ok(())
    }

    /// Mask policy implied by `hint_mask`
    pub const fn mask_policy(&self) -> MaskPolicy {
        if self.hint_mask {
            MaskPolicy::All
        } else {
            MaskPolicy::None
        }
    }
}

const fn default_seed() -> u64 {
    DEFAULT_SEED
}
const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
const fn default_eval_freq() -> usize {
    DEFAULT_EVAL_FREQ
}
const fn default_save_freq() -> usize {
    DEFAULT_SAVE_FREQ
}
const fn default_batch_log_freq() -> usize {
    DEFAULT_BATCH_LOG_FREQ
}
const fn default_learning_rate() -> f32 {
    DEFAULT_LEARNING_RATE
}
const fn default_beta1() -> f32 {
    DEFAULT_BETA1
}
const fn default_beta2() -> f32 {
    DEFAULT_BETA2
}
const fn default_scheduler_step_size() -> usize {
    DEFAULT_SCHEDULER_STEP_SIZE
}
const fn default_scheduler_gamma() -> f32 {
    DEFAULT_SCHEDULER_GAMMA
}
const fn default_image_size() -> usize {
    DEFAULT_IMAGE_SIZE
}
const fn default_hidden_channels() -> usize {
    DEFAULT_HIDDEN_CHANNELS
}
const fn default_eval_samples() -> usize {
    DEFAULT_EVAL_SAMPLES
}
const fn default_hint_multiplier() -> f32 {
    DEFAULT_HINT_MULTIPLIER
}
