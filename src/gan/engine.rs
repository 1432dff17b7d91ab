//! Alternating critic and generator updates
//!
//! Each training batch runs two strictly ordered phases. Write access to the
//! parameter groups is switched explicitly around each phase, and both groups
//! are left frozen between steps, so the only writer of a group is the
//! optimizer step of its own phase.

use crate::autodiff::{Var, backward};
use crate::data::batch::Batch;
use crate::gan::mask::{HintMasker, MaskPolicy, build_hint, hint_colors};
use crate::gan::penalty::gradient_penalty;
use crate::io::configuration::{ADAM_EPSILON, AdversarialConfig, TrainingConfig};
use crate::io::error::{Result, TrainingError, shape_mismatch};
use crate::nn::loss::{l1_loss, mse_loss};
use crate::nn::network::{Critic, FeatureExtractor, Generator};
use crate::nn::optimizer::{Adam, AdamConfig, AdamState};
use crate::nn::parameter::{Access, NamedTensor};
use ndarray::ArrayD;
use rand::Rng;
use tracing::{debug, trace};

/// Scalar losses of one training step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepLosses {
    /// Mean critic score of generated images
    pub critic_fake: f32,
    /// Mean critic score of real images
    pub critic_real: f32,
    /// Weighted gradient penalty
    pub gradient_penalty: f32,
    /// Down-weighted negated critic score seen by the generator
    pub adversarial: f32,
    /// Feature-space reconstruction error
    pub content: f32,
    /// Pixel-space absolute error
    pub l1: f32,
}

impl StepLosses {
    /// Combined generator objective
    pub fn generator_total(&self) -> f32 {
        (self.adversarial + self.content + self.l1) / 3.0
    }

    /// Wasserstein distance estimate `real - fake`
    pub fn wasserstein(&self) -> f32 {
        self.critic_real - self.critic_fake
    }

    fn is_finite(&self) -> bool {
        [
            self.critic_fake,
            self.critic_real,
            self.gradient_penalty,
            self.adversarial,
            self.content,
            self.l1,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Generated images of one evaluation batch
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Generated images in [-1, 1]
    pub fake: ArrayD<f32>,
    /// Hint mask used, when hints are enabled
    pub mask: Option<ArrayD<f32>>,
    /// Masked reference colours given to the generator, when hints are enabled
    pub hint: Option<ArrayD<f32>>,
    /// Mean absolute error against the target
    pub l1: f32,
}

/// Engine settings derived from a run configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Optimizer hyperparameters shared by both networks
    pub adam: AdamConfig,
    /// Loss coefficients
    pub coefficients: AdversarialConfig,
    /// Whether hints are built for the generator
    pub use_hint: bool,
    /// Spatial size of hint masks
    pub mask_size: usize,
}

impl EngineSettings {
    /// Settings for `config`
    pub const fn from_config(config: &TrainingConfig) -> Self {
        Self {
            adam: AdamConfig {
                learning_rate: config.common.learning_rate,
                beta1: config.common.beta1,
                beta2: config.common.beta2,
                epsilon: ADAM_EPSILON,
            },
            coefficients: config.adversarial,
            use_hint: config.task.uses_hint(),
            mask_size: config.mask_size(),
        }
    }
}

/// Generator, critic, frozen encoders and their optimizers
#[derive(Debug)]
pub struct AdversarialEngine<G, C, E> {
    generator: G,
    critic: C,
    sketch_encoder: E,
    content_encoder: E,
    generator_optimizer: Adam,
    critic_optimizer: Adam,
    masker: HintMasker,
    settings: EngineSettings,
}

impl<G, C, E> AdversarialEngine<G, C, E>
where
    G: Generator,
    C: Critic,
    E: FeatureExtractor,
{
    /// Assemble an engine; both networks start frozen
    ///
    /// # Errors
    ///
    /// Returns an error if the optimizer settings are invalid
    pub fn new(
        mut generator: G,
        mut critic: C,
        sketch_encoder: E,
        content_encoder: E,
        settings: EngineSettings,
    ) -> Result<Self> {
        generator.parameters_mut().set_access(Access::Frozen);
        critic.parameters_mut().set_access(Access::Frozen);
        let generator_optimizer = Adam::new(settings.adam, generator.parameters().len())?;
        let critic_optimizer = Adam::new(settings.adam, critic.parameters().len())?;

        Ok(Self {
            generator,
            critic,
            sketch_encoder,
            content_encoder,
            generator_optimizer,
            critic_optimizer,
            masker: HintMasker::standard()?,
            settings,
        })
    }

    /// Current generator
    pub const fn generator(&self) -> &G {
        &self.generator
    }

    /// Current critic
    pub const fn critic(&self) -> &C {
        &self.critic
    }

    /// Engine settings
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Optimizer states of generator and critic, in that order
    pub fn optimizer_states(&self) -> (AdamState, AdamState) {
        (self.generator_optimizer.state(), self.critic_optimizer.state())
    }

    /// Mutable optimizers of generator and critic, for learning rate schedules
    pub const fn optimizers_mut(&mut self) -> (&mut Adam, &mut Adam) {
        (&mut self.generator_optimizer, &mut self.critic_optimizer)
    }

    /// Replace weights and optimizer states
    ///
    /// Every part is validated before anything is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if any part does not match the engine's layout
    pub fn restore(
        &mut self,
        generator: &[NamedTensor],
        critic: &[NamedTensor],
        generator_optimizer: AdamState,
        critic_optimizer: AdamState,
    ) -> Result<()> {
        let mut generator_params = self.generator.parameters().clone();
        generator_params.restore(generator)?;
        let mut critic_params = self.critic.parameters().clone();
        critic_params.restore(critic)?;
        let mut generator_adam = self.generator_optimizer.clone();
        generator_adam.load_state(generator_optimizer, &generator_params)?;
        let mut critic_adam = self.critic_optimizer.clone();
        critic_adam.load_state(critic_optimizer, &critic_params)?;

        *self.generator.parameters_mut() = generator_params;
        *self.critic.parameters_mut() = critic_params;
        self.generator_optimizer = generator_adam;
        self.critic_optimizer = critic_adam;
        Ok(())
    }

    /// Mask and hint for a batch, or `None` when hints are disabled
    ///
    /// # Errors
    ///
    /// Returns an error if the reference does not match the mask resolution
    pub fn hint_for<R: Rng + ?Sized>(
        &self,
        reference: &ArrayD<f32>,
        policy: MaskPolicy,
        multiplier: f32,
        rng: &mut R,
    ) -> Result<Option<(ArrayD<f32>, ArrayD<f32>)>> {
        if !self.settings.use_hint {
            return Ok(None);
        }
        let batch = reference.shape().first().copied().unwrap_or(0);
        let mask = self
            .masker
            .generate_mask(policy, batch, self.settings.mask_size, rng)?;
        let hint = build_hint(reference, &mask, multiplier)?;
        Ok(Some((mask, hint)))
    }

    /// Run one critic update followed by one generator update
    ///
    /// # Errors
    ///
    /// Returns an error on shape mismatches or if the penalty cannot be
    /// differentiated; the run cannot continue after either
    pub fn train_step<R: Rng + ?Sized>(
        &mut self,
        batch: &Batch,
        policy: MaskPolicy,
        rng: &mut R,
    ) -> Result<StepLosses> {
        check_batch(batch)?;
        let sketch = Var::constant(batch.sketch.clone());
        let real = Var::constant(batch.content.clone());
        let features = Var::constant(self.sketch_encoder.embed(&batch.sketch)?);
        let hint = self
            .hint_for(&batch.reference, policy, 1.0, rng)?
            .map(|(_, hint)| Var::constant(hint));
        let AdversarialConfig {
            adversarial_weight,
            real_score_stabilizer,
            gradient_penalty_weight,
        } = self.settings.coefficients;

        self.generator.parameters_mut().set_access(Access::Frozen);
        self.critic.parameters_mut().set_access(Access::Trainable);

        let fake = self
            .generator
            .forward(&sketch, hint.as_ref(), &features)?
            .detach();

        let fake_score = self.critic.forward(&fake, &features)?.mean()?;
        let mut gradients = backward(&fake_score)?;

        let real_score = self.critic.forward(&real, &features)?.mean()?;
        let real_term = real_score
            .neg()
            .add(&real_score.square().scale(real_score_stabilizer))?;
        gradients.accumulate(backward(&real_term)?)?;

        let penalty = gradient_penalty(
            &self.critic,
            &real,
            &fake,
            &features,
            gradient_penalty_weight,
            rng,
        )?;
        gradients.accumulate(backward(&penalty)?)?;

        let stepped = self
            .critic_optimizer
            .step(self.critic.parameters_mut(), &gradients)?;
        trace!(stepped, "critic parameters updated");

        self.critic.parameters_mut().set_access(Access::Frozen);
        self.generator.parameters_mut().set_access(Access::Trainable);

        let fake = self.generator.forward(&sketch, hint.as_ref(), &features)?;
        let adversarial = self
            .critic
            .forward(&fake, &features)?
            .mean()?
            .scale(-adversarial_weight);
        let fake_embedding = self.content_encoder.forward(&fake)?;
        let real_embedding = Var::constant(self.content_encoder.embed(&batch.content)?);
        let content = mse_loss(&fake_embedding, &real_embedding)?;
        let l1 = l1_loss(&fake, &real)?;
        let total = adversarial.add(&content)?.add(&l1)?.scale(1.0 / 3.0);

        let gradients = backward(&total)?;
        let stepped = self
            .generator_optimizer
            .step(self.generator.parameters_mut(), &gradients)?;
        trace!(stepped, "generator parameters updated");
        self.generator.parameters_mut().set_access(Access::Frozen);

        let losses = StepLosses {
            critic_fake: fake_score.item()?,
            critic_real: real_score.item()?,
            gradient_penalty: penalty.item()?,
            adversarial: adversarial.item()?,
            content: content.item()?,
            l1: l1.item()?,
        };
        if !losses.is_finite() {
            debug!(?losses, "non-finite loss observed; training continues");
        }
        Ok(losses)
    }

    /// Generate images without tracking gradients
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs have incompatible shapes
    pub fn generate(&self, sketch: &ArrayD<f32>, hint: Option<&ArrayD<f32>>) -> Result<ArrayD<f32>> {
        let features = Var::constant(self.sketch_encoder.embed(sketch)?);
        let hint = hint.map(|h| Var::constant(h.clone()));
        Ok(self
            .generator
            .forward(&Var::constant(sketch.clone()), hint.as_ref(), &features)?
            .value()
            .clone())
    }

    /// Generate images for a batch and score them with the L1 distance
    ///
    /// No parameter is updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch tensors have incompatible shapes
    pub fn evaluate_batch<R: Rng + ?Sized>(
        &self,
        batch: &Batch,
        policy: MaskPolicy,
        rng: &mut R,
    ) -> Result<Evaluation> {
        check_batch(batch)?;
        let hint = self.hint_for(&batch.reference, policy, 1.0, rng)?;
        let fake = self.generate(&batch.sketch, hint.as_ref().map(|(_, hint)| hint))?;
        let l1 = l1_loss(&Var::constant(fake.clone()), &Var::constant(batch.content.clone()))?
            .item()?;
        let (mask, hint) = match hint {
            Some((mask, hint)) => (Some(mask), Some(hint_colors(&hint)?)),
            None => (None, None),
        };
        Ok(Evaluation {
            fake,
            mask,
            hint,
            l1,
        })
    }
}

fn check_batch(batch: &Batch) -> Result<()> {
    let sizes = [
        batch.content.shape().first(),
        batch.reference.shape().first(),
        batch.sketch.shape().first(),
    ];
    match sizes {
        [Some(a), Some(b), Some(c)] if a == b && b == c && *a > 0 => Ok(()),
        [Some(_), Some(_), Some(_)] => Err(shape_mismatch(
            "batch",
            batch.content.shape(),
            batch.sketch.shape(),
        )),
        _ => Err(TrainingError::InvalidDataset {
            reason: "batch tensors must not be scalars".to_string(),
        }),
    }
}
