//! Checkpoint records and their on-disk store
//!
//! A record carries everything needed to resume: both networks, both
//! optimizer states, the configuration in effect and the last completed
//! epoch. Records are written as `<checkpoint_dir>/<run_id>/epoch-N.json`;
//! writes are not atomic.

use crate::io::configuration::{CHECKPOINT_PREFIX, JSON_EXTENSION, TrainingConfig};
use crate::io::error::{Result, TrainingError, WithContext};
use crate::nn::optimizer::AdamState;
use crate::nn::parameter::NamedTensor;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete resumable training state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    /// Generator weights
    pub net_g: Vec<NamedTensor>,
    /// Critic weights
    pub net_d: Vec<NamedTensor>,
    /// Generator optimizer state
    pub opt_g: AdamState,
    /// Critic optimizer state
    pub opt_d: AdamState,
    /// Configuration the run was started with
    pub config: TrainingConfig,
    /// Last completed epoch
    pub epoch: usize,
}

impl Checkpoint {
    /// Read a checkpoint; every entry must be present and no other
    ///
    /// # Errors
    ///
    /// Returns `Checkpoint` if the file cannot be read or parsed, or holds an
    /// invalid configuration
    pub fn load(path: &Path) -> Result<Self> {
        let rejected = |reason: String| TrainingError::Checkpoint {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| rejected(e.to_string()))?;
        let checkpoint: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| rejected(e.to_string()))?;
        checkpoint
            .config
            .validate()
            .map_err(|e| rejected(e.to_string()))?;
        Ok(checkpoint)
    }

    /// Write the checkpoint as JSON, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        let file = File::create(path).with_path(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).with_path(path)?;
        writer.flush().with_path(path)?;
        Ok(())
    }
}

/// Directory of checkpoints for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store for `run_id` under `root`
    pub fn new(root: &Path, run_id: &str) -> Self {
        Self {
            dir: root.join(run_id),
        }
    }

    /// Directory holding this run's checkpoints
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint for `epoch`
    pub fn path_for(&self, epoch: usize) -> PathBuf {
        self.dir
            .join(format!("{CHECKPOINT_PREFIX}{epoch}.{JSON_EXTENSION}"))
    }

    /// Write `checkpoint` under its epoch and return the path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let path = self.path_for(checkpoint.epoch);
        checkpoint.save(&path)?;
        info!(epoch = checkpoint.epoch, path = %path.display(), "checkpoint saved");
        Ok(path)
    }

    /// Epoch numbers of the stored checkpoints, ascending
    ///
    /// A missing directory yields no epochs.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read
    pub fn epochs(&self) -> Result<Vec<usize>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut epochs = Vec::new();
        for entry in std::fs::read_dir(&self.dir).with_path(&self.dir)? {
            let path = entry.with_path(&self.dir)?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(JSON_EXTENSION) {
                continue;
            }
            let epoch = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(epoch) = epoch {
                epochs.push(epoch);
            }
        }
        epochs.sort_unstable();
        Ok(epochs)
    }

    /// Path of the most recent checkpoint, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.epochs()?.last().map(|&epoch| self.path_for(epoch)))
    }

    /// Load the most recent checkpoint
    ///
    /// # Errors
    ///
    /// Returns `Checkpoint` if the run has no checkpoint or it is unreadable
    pub fn load_latest(&self) -> Result<Checkpoint> {
        let path = self.latest()?.ok_or_else(|| TrainingError::Checkpoint {
            path: self.dir.clone(),
            reason: "no checkpoint found for this run".to_string(),
        })?;
        Checkpoint::load(&path)
    }
}
