//! Command-line interface for training, inference and backbone preparation

use crate::io::configuration::{DEFAULT_SEED, InferenceConfig, TrainingConfig};
use crate::io::error::{Result, invalid_parameter};
use crate::io::logging::{Verbosity, init_logging};
use crate::io::progress::ProgressReporter;
use crate::nn::reference::BackboneWeights;
use crate::train::observer::{LoggingObserver, TrainingObserver};
use crate::train::{run_inference, train};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hintgan")]
#[command(
    author,
    version,
    about = "Train and run hint-conditioned adversarial image translation models"
)]
/// Command-line arguments shared by every subcommand
pub struct Cli {
    /// Only report warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report per-step detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Operation to perform
    #[command(subcommand)]
    pub command: Command,
}

/// Available operations
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train a generator and critic from a configuration file
    Train {
        /// JSON training configuration
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Override the exclusive final epoch
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Override the initial learning rate of both optimizers
        #[arg(long)]
        lr: Option<f32>,

        /// Override the run seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Continue from the latest checkpoint of the run
        #[arg(short, long)]
        resume: bool,
    },

    /// Generate images with a trained checkpoint
    Infer {
        /// JSON inference configuration
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Write randomly initialised encoder weights
    InitBackbone {
        /// Destination JSON file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Channels accepted by the encoder
        #[arg(long)]
        in_channels: usize,

        /// Feature channels produced by the encoder
        #[arg(long)]
        out_channels: usize,

        /// Seed for the initialisation
        #[arg(short, long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
}

impl Cli {
    /// Logging level selected by the global flags
    pub const fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Install logging and run the selected operation
    ///
    /// # Errors
    ///
    /// Returns any error raised by the selected operation
    pub fn execute(self) -> Result<()> {
        init_logging(self.verbosity());
        let show_progress = !self.quiet;

        match self.command {
            Command::Train {
                config,
                epochs,
                lr,
                seed,
                resume,
            } => {
                let mut training = TrainingConfig::load(&config)?;
                if resume && (lr.is_some() || seed.is_some()) {
                    warn!("learning rate and seed overrides are ignored when resuming");
                }
                if let Some(end_epoch) = epochs {
                    training.common.end_epoch = end_epoch;
                }
                if let Some(learning_rate) = lr {
                    training.common.learning_rate = learning_rate;
                }
                if let Some(seed) = seed {
                    training.common.seed = seed;
                }

                let mut observers: Vec<Box<dyn TrainingObserver>> =
                    vec![Box::new(LoggingObserver::new(training.common.batch_log_freq))];
                if show_progress {
                    observers.push(Box::new(ProgressReporter::new()));
                }
                let report = train(training, resume, observers)?;
                info!(
                    epochs = report.epochs_trained,
                    last_epoch = ?report.last_epoch,
                    "training finished"
                );
                Ok(())
            }
            Command::Infer { config } => {
                let inference = InferenceConfig::load(&config)?;
                run_inference(&inference)?;
                Ok(())
            }
            Command::InitBackbone {
                output,
                in_channels,
                out_channels,
                seed,
            } => {
                if output.exists() {
                    return Err(invalid_parameter(
                        "output",
                        &output.display(),
                        &"refusing to overwrite an existing file",
                    ));
                }
                let mut rng = StdRng::seed_from_u64(seed);
                BackboneWeights::random(in_channels, out_channels, &mut rng)?.save(&output)?;
                info!(path = %output.display(), in_channels, out_channels, "wrote backbone weights");
                Ok(())
            }
        }
    }
}
