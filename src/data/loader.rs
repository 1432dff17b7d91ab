//! Shuffled batch iteration over an indexed source of samples

use crate::data::batch::{Batch, ImagePair};
use crate::io::error::{ErrorContext, Result, WithContext, invalid_parameter};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Indexed collection of samples
pub trait PairSource {
    /// Number of samples
    fn len(&self) -> usize;

    /// Whether the source holds no samples
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display name of the sample at `index`, used for output file names
    fn name(&self, index: usize) -> String;

    /// Load the sample at `index`; random augmentation draws from `rng`
    ///
    /// # Errors
    ///
    /// Returns an error if the sample cannot be read or decoded
    fn load(&self, index: usize, rng: &mut StdRng) -> Result<ImagePair>;
}

impl<T: PairSource + ?Sized> PairSource for Box<T> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn name(&self, index: usize) -> String {
        (**self).name(index)
    }

    fn load(&self, index: usize, rng: &mut StdRng) -> Result<ImagePair> {
        (**self).load(index, rng)
    }
}

/// Splits a source into batches, reshuffled every epoch
///
/// The last batch of an epoch may be smaller than `batch_size`.
#[derive(Debug)]
pub struct DataLoader<S> {
    source: S,
    batch_size: usize,
    shuffle: bool,
}

impl<S: PairSource> DataLoader<S> {
    /// Create a loader
    ///
    /// # Errors
    ///
    /// Returns an error if `batch_size` is zero
    pub fn new(source: S, batch_size: usize, shuffle: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(invalid_parameter("batch_size", &batch_size, &"must be positive"));
        }
        Ok(Self {
            source,
            batch_size,
            shuffle,
        })
    }

    /// Underlying source
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Samples per full batch
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches produced per epoch
    pub fn num_batches(&self) -> usize {
        self.source.len().div_ceil(self.batch_size)
    }

    /// Iterate over one epoch, drawing the order and any augmentation from `rng`
    pub fn epoch<'a>(&'a self, rng: &'a mut StdRng) -> EpochBatches<'a, S> {
        let mut order: Vec<usize> = (0..self.source.len()).collect();
        if self.shuffle {
            order.shuffle(rng);
        }
        EpochBatches {
            loader: self,
            order,
            cursor: 0,
            batch_index: 0,
            rng,
        }
    }
}

/// Iterator over the batches of one epoch
#[derive(Debug)]
pub struct EpochBatches<'a, S> {
    loader: &'a DataLoader<S>,
    order: Vec<usize>,
    cursor: usize,
    batch_index: usize,
    rng: &'a mut StdRng,
}

impl<S: PairSource> Iterator for EpochBatches<'_, S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let indices = self.order.get(self.cursor..end)?;
        if indices.is_empty() {
            return None;
        }
        self.cursor = end;
        let batch_index = self.batch_index;
        self.batch_index += 1;

        let source = &self.loader.source;
        let mut pairs = Vec::with_capacity(indices.len());
        let mut names = Vec::with_capacity(indices.len());
        for &index in indices {
            match source.load(index, self.rng) {
                Ok(pair) => pairs.push(pair),
                Err(e) => {
                    return Some(Err(e).with_context(ErrorContext {
                        batch: Some(batch_index),
                        ..Default::default()
                    }));
                }
            }
            names.push(source.name(index));
        }
        Some(Batch::stack(&pairs, names))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .order
            .len()
            .saturating_sub(self.cursor)
            .div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}
