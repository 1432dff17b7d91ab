//! Epoch loop, evaluation cadence, checkpointing and resume

use crate::augment::pipeline::PairAugmenter;
use crate::data::batch::Batch;
use crate::data::folders::{ColorizationFolder, SketchSimplificationFolder};
use crate::data::loader::{DataLoader, PairSource};
use crate::gan::engine::{AdversarialEngine, EngineSettings, Evaluation};
use crate::io::checkpoint::{Checkpoint, CheckpointStore};
use crate::io::configuration::{TaskConfig, TrainingConfig};
use crate::io::error::{
    ErrorContext, Result, TrainingError, WithContext, invalid_parameter, shape_mismatch,
};
use crate::io::visualization::{Panel, PngStripSink, SampleSink};
use crate::nn::network::{Critic, FeatureExtractor, Generator};
use crate::nn::reference::{
    CriticShape, GeneratorShape, PixelCritic, PixelGenerator, PooledEncoder,
};
use crate::nn::scheduler::StepDecay;
use crate::train::metrics::{EpochSummary, LossAccumulator, WeightedMean};
use crate::train::observer::TrainingObserver;
use ndarray::{ArrayD, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Engine built from the reference networks
pub type ReferenceEngine = AdversarialEngine<PixelGenerator, PixelCritic, PooledEncoder>;

/// Random stream shuffling and augmenting training data
pub const TRAIN_DATA_STREAM: u64 = 0;
/// Random stream of training masks and penalty interpolation
pub const TRAIN_STEP_STREAM: u64 = 1;
/// Random stream of evaluation masks
pub const EVAL_STREAM: u64 = 2;

/// Generator for `stream` in `epoch`, derived only from the run seed
///
/// Resuming at an epoch therefore replays exactly the randomness an
/// uninterrupted run would have used.
pub fn derive_rng(seed: u64, epoch: usize, stream: u64) -> StdRng {
    const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut state = seed
        ^ (epoch as u64).wrapping_add(1).wrapping_mul(GOLDEN)
        ^ stream.wrapping_add(1).wrapping_mul(GOLDEN.rotate_left(17));
    // splitmix64 finaliser
    state = (state ^ (state >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    state = (state ^ (state >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    StdRng::seed_from_u64(state ^ (state >> 31))
}

/// Load the frozen encoders and initialise fresh reference networks
///
/// # Errors
///
/// Returns `MissingWeights` if a backbone cannot be loaded and
/// `ShapeMismatch` if its channel counts do not fit the task
pub fn build_reference_engine(config: &TrainingConfig) -> Result<ReferenceEngine> {
    let target_channels = config.task.target_channels();
    let sketch_encoder = PooledEncoder::load(&config.backbones.sketch_encoder)?;
    let content_encoder = PooledEncoder::load(&config.backbones.content_encoder)?;
    if sketch_encoder.in_channels() != 1 {
        return Err(shape_mismatch("sketch encoder input", &[1], &[sketch_encoder.in_channels()]));
    }
    if content_encoder.in_channels() != target_channels {
        return Err(shape_mismatch(
            "content encoder input",
            &[target_channels],
            &[content_encoder.in_channels()],
        ));
    }

    let mut rng = StdRng::seed_from_u64(config.common.seed);
    let hidden_channels = config.common.hidden_channels;
    let generator = PixelGenerator::new(
        GeneratorShape {
            sketch_channels: 1,
            hint_channels: config.task.hint_channels(),
            feature_channels: sketch_encoder.out_channels(),
            hidden_channels,
            output_channels: target_channels,
        },
        &mut rng,
    )?;
    let critic = PixelCritic::new(
        CriticShape {
            image_channels: target_channels,
            feature_channels: sketch_encoder.out_channels(),
            hidden_channels,
        },
        &mut rng,
    )?;

    AdversarialEngine::new(
        generator,
        critic,
        sketch_encoder,
        content_encoder,
        EngineSettings::from_config(config),
    )
}

/// Dataset of one split directory, augmented when `training`
///
/// # Errors
///
/// Returns an error if the directory layout is invalid
pub fn open_split(config: &TrainingConfig, dir: &Path, training: bool) -> Result<Box<dyn PairSource>> {
    let size = u32::try_from(config.common.image_size)
        .map_err(|_| invalid_parameter("image_size", &config.common.image_size, &"too large"))?;
    Ok(match &config.task {
        TaskConfig::Colorization { .. } => Box::new(ColorizationFolder::open(dir, size, training)?),
        TaskConfig::SketchSimplification {
            a_to_b,
            augmentation,
        } => {
            let augmenter = if training {
                Some(PairAugmenter::new(*augmentation, size)?)
            } else {
                None
            };
            Box::new(SketchSimplificationFolder::open(dir, *a_to_b, size, augmenter)?)
        }
    })
}

/// Outcome of [`Trainer::run`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    /// Epochs trained in this invocation
    pub epochs_trained: usize,
    /// Summary of the final epoch
    pub last_epoch: Option<EpochSummary>,
    /// Most recent successful evaluation error
    pub last_evaluation: Option<f32>,
}

/// Drives the adversarial engine over epochs
pub struct Trainer<G, C, E> {
    config: TrainingConfig,
    engine: AdversarialEngine<G, C, E>,
    train_loader: DataLoader<Box<dyn PairSource>>,
    eval_loader: DataLoader<Box<dyn PairSource>>,
    generator_schedule: StepDecay,
    critic_schedule: StepDecay,
    store: CheckpointStore,
    sink: Box<dyn SampleSink>,
    observers: Vec<Box<dyn TrainingObserver>>,
    next_epoch: usize,
}

impl<G, C, E> Trainer<G, C, E>
where
    G: Generator,
    C: Critic,
    E: FeatureExtractor,
{
    /// Trainer starting at the configured first epoch
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or either dataset is empty or invalid
    pub fn new(
        config: TrainingConfig,
        engine: AdversarialEngine<G, C, E>,
        train_source: Box<dyn PairSource>,
        eval_source: Box<dyn PairSource>,
        sink: Box<dyn SampleSink>,
    ) -> Result<Self> {
        config.validate()?;
        if train_source.is_empty() {
            return Err(TrainingError::InvalidDataset {
                reason: "training split holds no samples".to_string(),
            });
        }
        let common = &config.common;
        let schedule = StepDecay::new(
            common.learning_rate,
            common.scheduler_step_size,
            common.scheduler_gamma,
        )?;
        let store = CheckpointStore::new(&common.checkpoint_dir, &common.run_id);
        let next_epoch = common.start_epoch;

        Ok(Self {
            train_loader: DataLoader::new(train_source, common.batch_size, true)?,
            eval_loader: DataLoader::new(eval_source, common.batch_size, false)?,
            generator_schedule: schedule,
            critic_schedule: schedule,
            store,
            sink,
            observers: Vec::new(),
            next_epoch,
            engine,
            config,
        })
    }

    /// Register an observer
    pub fn add_observer(&mut self, observer: Box<dyn TrainingObserver>) {
        self.observers.push(observer);
    }

    /// Configuration of the run
    pub const fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Engine being trained
    pub const fn engine(&self) -> &AdversarialEngine<G, C, E> {
        &self.engine
    }

    /// First epoch the next call to [`Self::run`] trains
    pub const fn next_epoch(&self) -> usize {
        self.next_epoch
    }

    /// Checkpoint store of the run
    pub const fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Snapshot of the state after completing `epoch`
    pub fn checkpoint(&self, epoch: usize) -> Checkpoint {
        let (opt_g, opt_d) = self.engine.optimizer_states();
        Checkpoint {
            net_g: self.engine.generator().parameters().snapshot(),
            net_d: self.engine.critic().parameters().snapshot(),
            opt_g,
            opt_d,
            config: self.config.clone(),
            epoch,
        }
    }

    /// Continue from `checkpoint`, which was read from `path`
    ///
    /// # Errors
    ///
    /// Returns `Checkpoint` if it was written under a different
    /// configuration, apart from the end epoch, or does not fit the
    /// networks; nothing is changed then
    pub fn restore(&mut self, checkpoint: Checkpoint, path: &Path) -> Result<()> {
        let rejected = |reason: String| TrainingError::Checkpoint {
            path: path.to_path_buf(),
            reason,
        };
        if checkpoint.config.with_end_epoch(self.config.common.end_epoch) != self.config {
            return Err(rejected("written under a different configuration".to_string()));
        }
        let next_epoch = checkpoint.epoch + 1;
        let completed = next_epoch.saturating_sub(self.config.common.start_epoch);
        let common = &self.config.common;
        let schedule = StepDecay::at_epoch(
            common.learning_rate,
            common.scheduler_step_size,
            common.scheduler_gamma,
            completed,
        )?;

        self.engine
            .restore(&checkpoint.net_g, &checkpoint.net_d, checkpoint.opt_g, checkpoint.opt_d)
            .map_err(|e| rejected(e.to_string()))?;
        self.generator_schedule = schedule;
        self.critic_schedule = schedule;
        self.next_epoch = next_epoch;
        info!(epoch = checkpoint.epoch, path = %path.display(), "resumed from checkpoint");
        Ok(())
    }

    /// Train until the configured end epoch
    ///
    /// Evaluation failures are reported and skipped; any other failure stops
    /// the run.
    ///
    /// # Errors
    ///
    /// Returns the first training, data or checkpoint error
    pub fn run(&mut self) -> Result<TrainingReport> {
        let end_epoch = self.config.common.end_epoch;
        let batches = self.train_loader.num_batches();
        for observer in &mut self.observers {
            observer.on_train_start(self.next_epoch, end_epoch, batches);
        }

        let mut report = TrainingReport {
            epochs_trained: 0,
            last_epoch: None,
            last_evaluation: None,
        };
        while self.next_epoch < end_epoch {
            let epoch = self.next_epoch;
            let summary = self.train_epoch(epoch)?;
            report.last_epoch = Some(summary);
            report.epochs_trained += 1;

            let common = &self.config.common;
            if (epoch + 1) % common.eval_freq == 0 {
                match self.evaluate(epoch) {
                    Ok(Some(l1)) => {
                        report.last_evaluation = Some(l1);
                        for observer in &mut self.observers {
                            observer.on_evaluation(epoch, l1);
                        }
                    }
                    Ok(None) => warn!(epoch, "evaluation split is empty"),
                    Err(error) => {
                        warn!(epoch, %error, "evaluation failed; continuing");
                        for observer in &mut self.observers {
                            observer.on_evaluation_failed(epoch, &error);
                        }
                    }
                }
            }

            let common = &self.config.common;
            if (epoch + 1) % common.save_freq == 0 || epoch + 1 == end_epoch {
                let path = self.store.save(&self.checkpoint(epoch))?;
                for observer in &mut self.observers {
                    observer.on_checkpoint(epoch, &path);
                }
            }
            self.next_epoch = epoch + 1;
        }

        for observer in &mut self.observers {
            observer.on_train_end(report.epochs_trained);
        }
        Ok(report)
    }

    fn train_epoch(&mut self, epoch: usize) -> Result<EpochSummary> {
        let seed = self.config.common.seed;
        let policy = self.config.task.train_mask();
        let learning_rate = self.generator_schedule.learning_rate();
        {
            let (generator_optimizer, critic_optimizer) = self.engine.optimizers_mut();
            self.generator_schedule.apply(generator_optimizer);
            self.critic_schedule.apply(critic_optimizer);
        }
        for observer in &mut self.observers {
            observer.on_epoch_start(epoch, learning_rate);
        }

        let mut data_rng = derive_rng(seed, epoch, TRAIN_DATA_STREAM);
        let mut step_rng = derive_rng(seed, epoch, TRAIN_STEP_STREAM);
        let mut accumulator = LossAccumulator::new();

        for (index, batch) in self.train_loader.epoch(&mut data_rng).enumerate() {
            let context = ErrorContext {
                epoch: Some(epoch),
                batch: Some(index),
                ..Default::default()
            };
            let batch = batch.with_context(context.clone())?;
            let losses = self
                .engine
                .train_step(&batch, policy, &mut step_rng)
                .with_context(context)?;
            accumulator.add(&losses);
            for observer in &mut self.observers {
                observer.on_batch_end(epoch, index, &losses);
            }
        }

        self.generator_schedule.step();
        self.critic_schedule.step();

        let summary = EpochSummary {
            epoch,
            batches: accumulator.count(),
            mean: accumulator.mean().unwrap_or_default(),
            learning_rate,
        };
        for observer in &mut self.observers {
            observer.on_epoch_end(&summary);
        }
        Ok(summary)
    }

    /// Mean L1 error over the evaluation split, writing sample strips
    ///
    /// Returns `None` when the split is empty.
    ///
    /// # Errors
    ///
    /// Returns the first data, generation or rendering error
    pub fn evaluate(&mut self, epoch: usize) -> Result<Option<f32>> {
        let seed = self.config.common.seed;
        let policy = self.config.task.eval_mask();
        let output_dir = self
            .config
            .common
            .eval_output_dir
            .join(&self.config.common.run_id)
            .join(format!("epoch-{epoch}"));
        let mut remaining_samples = self.config.common.eval_samples;

        let mut data_rng = derive_rng(seed, epoch, EVAL_STREAM);
        let mut mask_rng = derive_rng(seed, epoch, EVAL_STREAM.wrapping_add(1));
        let mut mean = WeightedMean::default();

        for batch in self.eval_loader.epoch(&mut data_rng) {
            let batch = batch?;
            let evaluation = self.engine.evaluate_batch(&batch, policy, &mut mask_rng)?;
            mean.add(evaluation.l1, batch.len());

            let rendered = remaining_samples.min(batch.len());
            for index in 0..rendered {
                let panels = sample_panels(&batch, &evaluation, index, self.config.task.uses_hint())?;
                let name = batch.names.get(index).cloned().unwrap_or_default();
                self.sink
                    .render(&panels, &output_dir.join(format!("{name}.png")))?;
            }
            remaining_samples -= rendered;
        }
        Ok(mean.mean())
    }
}

/// Panels shown for one evaluated sample: sketch, hint inputs, result and target
///
/// Hint inputs are the masked colours the generator saw, the mask and the
/// unmasked reference.
///
/// # Errors
///
/// Returns an error if `index` is out of range
pub fn sample_panels(
    batch: &Batch,
    evaluation: &Evaluation,
    index: usize,
    show_hint: bool,
) -> Result<Vec<Panel>> {
    let pick = |tensor: &ArrayD<f32>| -> Result<ArrayD<f32>> {
        if index < tensor.len_of(Axis(0)) {
            Ok(tensor.index_axis(Axis(0), index).to_owned())
        } else {
            Err(shape_mismatch("sample panels", &[index + 1], tensor.shape()))
        }
    };
    let grayscale = batch.content.shape().get(1) == Some(&1);

    let mut panels = vec![Panel::image(pick(&batch.sketch)?, "sketch", true)];
    if show_hint {
        if let Some(hint) = &evaluation.hint {
            panels.push(Panel::image(pick(hint)?, "hint", grayscale));
        }
        if let Some(mask) = &evaluation.mask {
            panels.push(Panel::mask(pick(mask)?, "mask"));
        }
        panels.push(Panel::image(pick(&batch.reference)?, "reference", grayscale));
    }
    panels.push(Panel::image(pick(&evaluation.fake)?, "generated", grayscale));
    panels.push(Panel::image(pick(&batch.content)?, "target", grayscale));
    Ok(panels)
}

/// Build and run a training job from a configuration
///
/// With `resume` the latest checkpoint of the run is loaded and its stored
/// configuration replaces `config`, except for the end epoch, which is
/// taken from `config` so a finished run can be extended.
///
/// # Errors
///
/// Returns configuration, dataset, checkpoint or training errors
pub fn train(
    config: TrainingConfig,
    resume: bool,
    observers: Vec<Box<dyn TrainingObserver>>,
) -> Result<TrainingReport> {
    let (config, checkpoint) = if resume {
        let store = CheckpointStore::new(&config.common.checkpoint_dir, &config.common.run_id);
        let path: PathBuf = store.latest()?.ok_or_else(|| TrainingError::Checkpoint {
            path: store.dir().to_path_buf(),
            reason: "no checkpoint found for this run".to_string(),
        })?;
        let checkpoint = Checkpoint::load(&path)?;
        let resumed = checkpoint.config.with_end_epoch(config.common.end_epoch);
        resumed.validate()?;
        if resumed != config {
            warn!(path = %path.display(), "using the configuration stored in the checkpoint");
        }
        if resumed.common.end_epoch != checkpoint.config.common.end_epoch {
            info!(
                from = checkpoint.config.common.end_epoch,
                to = resumed.common.end_epoch,
                "end epoch changed for the resumed run"
            );
        }
        (resumed, Some((checkpoint, path)))
    } else {
        config.validate()?;
        (config, None)
    };

    let engine = build_reference_engine(&config)?;
    let root = &config.common.dataset_root;
    let train_source = open_split(&config, &root.join("train"), true)?;
    let eval_source = open_split(&config, &root.join("val"), false)?;

    let mut trainer = Trainer::new(
        config,
        engine,
        train_source,
        eval_source,
        Box::new(PngStripSink::default()),
    )?;
    for observer in observers {
        trainer.add_observer(observer);
    }
    if let Some((checkpoint, path)) = checkpoint {
        trainer.restore(checkpoint, &path)?;
    }
    trainer.run()
}
