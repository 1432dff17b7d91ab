//! Co-registered image triples and their stacked batch form

use crate::io::error::{Result, TrainingError, shape_mismatch};
use ndarray::{ArrayD, Axis, stack};

/// Content, reference and sketch of one sample as (C, H, W) tensors in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePair {
    content: ArrayD<f32>,
    reference: ArrayD<f32>,
    sketch: ArrayD<f32>,
}

impl ImagePair {
    /// Bundle three images of identical spatial size
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` unless all three are rank 3 with equal height and width
    pub fn new(content: ArrayD<f32>, reference: ArrayD<f32>, sketch: ArrayD<f32>) -> Result<Self> {
        let spatial = |t: &ArrayD<f32>| match *t.shape() {
            [_, h, w] => Some((h, w)),
            _ => None,
        };
        match (spatial(&content), spatial(&reference), spatial(&sketch)) {
            (Some(a), Some(b), Some(c)) if a == b && b == c => Ok(Self {
                content,
                reference,
                sketch,
            }),
            _ => Err(shape_mismatch("image pair", content.shape(), sketch.shape())),
        }
    }

    /// Target image
    pub const fn content(&self) -> &ArrayD<f32> {
        &self.content
    }

    /// Image hints are taken from
    pub const fn reference(&self) -> &ArrayD<f32> {
        &self.reference
    }

    /// Single-channel input drawing
    pub const fn sketch(&self) -> &ArrayD<f32> {
        &self.sketch
    }
}

/// `B` samples stacked into (B, C, H, W) tensors
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Target images
    pub content: ArrayD<f32>,
    /// Hint sources
    pub reference: ArrayD<f32>,
    /// Input drawings
    pub sketch: ArrayD<f32>,
    /// Display name of each sample
    pub names: Vec<String>,
}

impl Batch {
    /// Stack samples in order
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataset` for an empty slice and `ShapeMismatch` when
    /// samples differ in shape
    pub fn stack(pairs: &[ImagePair], names: Vec<String>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(TrainingError::InvalidDataset {
                reason: "cannot stack an empty batch".to_string(),
            });
        }
        if names.len() != pairs.len() {
            return Err(shape_mismatch("batch names", &[pairs.len()], &[names.len()]));
        }
        let stack_field = |field: fn(&ImagePair) -> &ArrayD<f32>| -> Result<ArrayD<f32>> {
            let views: Vec<_> = pairs.iter().map(|p| field(p).view()).collect();
            stack(Axis(0), &views).map_err(|_| {
                let first = pairs.first().map_or(&[][..], |p| field(p).shape());
                let mismatched = pairs
                    .iter()
                    .map(|p| field(p).shape())
                    .find(|s| *s != first)
                    .unwrap_or(first);
                shape_mismatch("batch stack", first, mismatched)
            })
        };

        Ok(Self {
            content: stack_field(ImagePair::content)?,
            reference: stack_field(ImagePair::reference)?,
            sketch: stack_field(ImagePair::sketch)?,
            names,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Copy out the sample at `index`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `index` is out of range
    pub fn sample(&self, index: usize) -> Result<ImagePair> {
        if index >= self.len() {
            return Err(crate::io::error::invalid_parameter(
                "sample index",
                &index,
                &format!("batch has {} samples", self.len()),
            ));
        }
        ImagePair::new(
            self.content.index_axis(Axis(0), index).to_owned(),
            self.reference.index_axis(Axis(0), index).to_owned(),
            self.sketch.index_axis(Axis(0), index).to_owned(),
        )
    }
}
