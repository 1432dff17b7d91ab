//! Compact pointwise reference networks
//!
//! These keep the whole pipeline executable without committing to a
//! convolutional architecture: every pixel (or pooled cell) is processed by
//! a small two-layer perceptron, with coarse inputs upsampled to match.

use crate::autodiff::Var;
use crate::io::error::{Result, TrainingError, WithContext, invalid_parameter, shape_mismatch};
use crate::nn::layers::{add_bias, avg_pool, dims4, from_rows, pointwise, scale_factor, upsample_nearest};
use crate::nn::network::{Critic, FeatureExtractor, Generator, Network};
use crate::nn::parameter::{Access, ParameterGroup, normal_init};
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Standard deviation of initial weights
pub const INIT_STD: f32 = 0.02;

/// Negative slope of hidden activations
pub const LEAKY_SLOPE: f32 = 0.2;

/// Spatial reduction applied by the feature encoders
pub const ENCODER_POOL_FACTOR: usize = 4;

fn zeros(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::zeros(IxDyn(shape))
}

/// Layer sizes of a [`PixelGenerator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorShape {
    /// Channels of the sketch input
    pub sketch_channels: usize,
    /// Channels of the hint input, zero when hints are never supplied
    pub hint_channels: usize,
    /// Channels of the sketch feature embedding
    pub feature_channels: usize,
    /// Width of the hidden layer
    pub hidden_channels: usize,
    /// Channels of the generated image
    pub output_channels: usize,
}

/// Per-pixel generator with nearest-upsampled hint and feature inputs
#[derive(Debug, Clone)]
pub struct PixelGenerator {
    shape: GeneratorShape,
    params: ParameterGroup,
}

impl PixelGenerator {
    const SKETCH_WEIGHT: usize = 0;
    const FEATURE_WEIGHT: usize = 1;
    const HIDDEN_BIAS: usize = 2;
    const OUTPUT_WEIGHT: usize = 3;
    const OUTPUT_BIAS: usize = 4;
    const HINT_WEIGHT: usize = 5;

    /// Create a generator with normally initialised weights
    ///
    /// # Errors
    ///
    /// Returns an error if any layer size is zero
    pub fn new<R: Rng + ?Sized>(shape: GeneratorShape, rng: &mut R) -> Result<Self> {
        let GeneratorShape {
            sketch_channels,
            hint_channels,
            feature_channels,
            hidden_channels,
            output_channels,
        } = shape;
        for (name, size) in [
            ("sketch_channels", sketch_channels),
            ("feature_channels", feature_channels),
            ("hidden_channels", hidden_channels),
            ("output_channels", output_channels),
        ] {
            if size == 0 {
                return Err(invalid_parameter(name, &size, &"must be positive"));
            }
        }

        let mut params = ParameterGroup::new("generator", Access::Frozen);
        params.push("sketch_weight", normal_init(&[sketch_channels, hidden_channels], INIT_STD, rng)?);
        params.push("feature_weight", normal_init(&[feature_channels, hidden_channels], INIT_STD, rng)?);
        params.push("hidden_bias", zeros(&[hidden_channels]));
        params.push("output_weight", normal_init(&[hidden_channels, output_channels], INIT_STD, rng)?);
        params.push("output_bias", zeros(&[output_channels]));
        if hint_channels > 0 {
            params.push("hint_weight", normal_init(&[hint_channels, hidden_channels], INIT_STD, rng)?);
        }

        Ok(Self { shape, params })
    }

    /// Layer sizes
    pub const fn shape(&self) -> GeneratorShape {
        self.shape
    }
}

impl Network for PixelGenerator {
    fn parameters(&self) -> &ParameterGroup {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterGroup {
        &mut self.params
    }
}

impl Generator for PixelGenerator {
    fn forward(&self, sketch: &Var, hint: Option<&Var>, features: &Var) -> Result<Var> {
        let [b, _, h, w] = dims4(sketch)?;
        let [_, _, feature_h, _] = dims4(features)?;

        let features = upsample_nearest(features, scale_factor(h, feature_h)?)?;
        let mut pre_activation = pointwise(sketch, self.params.get(Self::SKETCH_WEIGHT)?)?
            .add(&pointwise(&features, self.params.get(Self::FEATURE_WEIGHT)?)?)?;

        if let Some(hint) = hint {
            if self.shape.hint_channels == 0 {
                return Err(shape_mismatch("generator hint", &[0], hint.shape()));
            }
            let [_, _, hint_h, _] = dims4(hint)?;
            let hint = upsample_nearest(hint, scale_factor(h, hint_h)?)?;
            pre_activation =
                pre_activation.add(&pointwise(&hint, self.params.get(Self::HINT_WEIGHT)?)?)?;
        }

        let hidden = add_bias(&pre_activation, self.params.get(Self::HIDDEN_BIAS)?)?
            .leaky_relu(LEAKY_SLOPE);
        let output = add_bias(
            &hidden.matmul(self.params.get(Self::OUTPUT_WEIGHT)?)?,
            self.params.get(Self::OUTPUT_BIAS)?,
        )?
        .tanh();

        from_rows(&output, b, h, w)
    }
}

/// Layer sizes of a [`PixelCritic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticShape {
    /// Channels of the scored image
    pub image_channels: usize,
    /// Channels of the sketch feature embedding
    pub feature_channels: usize,
    /// Width of the hidden layer
    pub hidden_channels: usize,
}

/// Critic scoring pooled image cells against sketch features
///
/// The image is average-pooled to the feature resolution, each cell is
/// scored by a perceptron, and cell scores are averaged per sample.
#[derive(Debug, Clone)]
pub struct PixelCritic {
    shape: CriticShape,
    params: ParameterGroup,
}

impl PixelCritic {
    const IMAGE_WEIGHT: usize = 0;
    const FEATURE_WEIGHT: usize = 1;
    const HIDDEN_BIAS: usize = 2;
    const OUTPUT_WEIGHT: usize = 3;
    const OUTPUT_BIAS: usize = 4;

    /// Create a critic with normally initialised weights
    ///
    /// # Errors
    ///
    /// Returns an error if any layer size is zero
    pub fn new<R: Rng + ?Sized>(shape: CriticShape, rng: &mut R) -> Result<Self> {
        let CriticShape {
            image_channels,
            feature_channels,
            hidden_channels,
        } = shape;
        for (name, size) in [
            ("image_channels", image_channels),
            ("feature_channels", feature_channels),
            ("hidden_channels", hidden_channels),
        ] {
            if size == 0 {
                return Err(invalid_parameter(name, &size, &"must be positive"));
            }
        }

        let mut params = ParameterGroup::new("critic", Access::Frozen);
        params.push("image_weight", normal_init(&[image_channels, hidden_channels], INIT_STD, rng)?);
        params.push("feature_weight", normal_init(&[feature_channels, hidden_channels], INIT_STD, rng)?);
        params.push("hidden_bias", zeros(&[hidden_channels]));
        params.push("output_weight", normal_init(&[hidden_channels, 1], INIT_STD, rng)?);
        params.push("output_bias", zeros(&[1]));

        Ok(Self { shape, params })
    }

    /// Layer sizes
    pub const fn shape(&self) -> CriticShape {
        self.shape
    }
}

impl Network for PixelCritic {
    fn parameters(&self) -> &ParameterGroup {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterGroup {
        &mut self.params
    }
}

impl Critic for PixelCritic {
    fn forward(&self, image: &Var, features: &Var) -> Result<Var> {
        let [b, _, h, _] = dims4(image)?;
        let [feature_b, _, feature_h, feature_w] = dims4(features)?;
        if feature_b != b {
            return Err(shape_mismatch("critic features", &[b], &[feature_b]));
        }

        let pooled = avg_pool(image, scale_factor(h, feature_h)?)?;
        let pre_activation = pointwise(&pooled, self.params.get(Self::IMAGE_WEIGHT)?)?
            .add(&pointwise(features, self.params.get(Self::FEATURE_WEIGHT)?)?)?;
        let hidden = add_bias(&pre_activation, self.params.get(Self::HIDDEN_BIAS)?)?
            .leaky_relu(LEAKY_SLOPE);
        let cell_scores = add_bias(
            &hidden.matmul(self.params.get(Self::OUTPUT_WEIGHT)?)?,
            self.params.get(Self::OUTPUT_BIAS)?,
        )?;

        let cells = feature_h * feature_w;
        cell_scores
            .reshape(&[b, cells])?
            .sum_axis(1)?
            .scale(1.0 / cells as f32)
            .reshape(&[b, 1])
    }
}

/// On-disk weights of a frozen [`PooledEncoder`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackboneWeights {
    /// Channels of the encoded image
    pub in_channels: usize,
    /// Channels of the embedding
    pub out_channels: usize,
    /// Projection matrix of shape (`in_channels`, `out_channels`)
    pub weight: ArrayD<f32>,
    /// Bias of length `out_channels`
    pub bias: ArrayD<f32>,
}

impl BackboneWeights {
    /// Randomly initialised weights
    ///
    /// # Errors
    ///
    /// Returns an error if either channel count is zero
    pub fn random<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(invalid_parameter(
                "channels",
                &format!("{in_channels}->{out_channels}"),
                &"must be positive",
            ));
        }
        let std_dev = 1.0 / (in_channels as f32).sqrt();
        Ok(Self {
            in_channels,
            out_channels,
            weight: normal_init(&[in_channels, out_channels], std_dev, rng)?,
            bias: zeros(&[out_channels]),
        })
    }

    /// Load weights from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `MissingWeights` if the file cannot be opened, parsed, or has
    /// inconsistent shapes
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| TrainingError::MissingWeights {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let weights: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            TrainingError::MissingWeights {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        weights.validate().map_err(|e| TrainingError::MissingWeights {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(weights)
    }

    /// Write weights as JSON, creating parent directories
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

    fn validate(&self) -> Result<()> {
        if self.weight.shape() != [self.in_channels, self.out_channels] {
            return Err(shape_mismatch(
                "backbone weight",
                &[self.in_channels, self.out_channels],
                self.weight.shape(),
            ));
        }
        if self.bias.shape() != [self.out_channels] {
            return Err(shape_mismatch(
                "backbone bias",
                &[self.out_channels],
                self.bias.shape(),
            ));
        }
        Ok(())
    }
}

/// Frozen encoder: 4×4 average pooling, then a per-cell projection
#[derive(Debug, Clone)]
pub struct PooledEncoder {
    in_channels: usize,
    out_channels: usize,
    params: ParameterGroup,
}

impl PooledEncoder {
    const WEIGHT: usize = 0;
    const BIAS: usize = 1;

    /// Build a frozen encoder from weights
    ///
    /// # Errors
    ///
    /// Returns an error if the weight shapes are inconsistent
    pub fn from_weights(weights: BackboneWeights) -> Result<Self> {
        weights.validate()?;
        let mut params = ParameterGroup::new("backbone", Access::Frozen);
        params.push("weight", weights.weight);
        params.push("bias", weights.bias);
        Ok(Self {
            in_channels: weights.in_channels,
            out_channels: weights.out_channels,
            params,
        })
    }

    /// Load a frozen encoder from a weights file
    ///
    /// # Errors
    ///
    /// Returns `MissingWeights` if the file is absent or malformed
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_weights(BackboneWeights::load(path)?)
    }

    /// Channels expected in encoded images
    pub const fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Channels of the produced embedding
    pub const fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl FeatureExtractor for PooledEncoder {
    fn forward(&self, image: &Var) -> Result<Var> {
        let [b, c, h, w] = dims4(image)?;
        if c != self.in_channels {
            return Err(shape_mismatch("encoder input", &[b, self.in_channels, h, w], image.shape()));
        }
        let pooled = avg_pool(image, ENCODER_POOL_FACTOR)?;
        let rows = add_bias(
            &pointwise(&pooled, self.params.get(Self::WEIGHT)?)?,
            self.params.get(Self::BIAS)?,
        )?
        .leaky_relu(LEAKY_SLOPE);
        from_rows(&rows, b, h / ENCODER_POOL_FACTOR, w / ENCODER_POOL_FACTOR)
    }
}
