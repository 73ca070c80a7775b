//! Index samplers selecting the train and validation subsets of a dataset.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Yields the ordered dataset indices visited in one epoch.
pub trait Sampler: Send {
    fn indices(&self, epoch: usize) -> Vec<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Visits a fixed subset of indices in the given order, every epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetSampler {
    indices: Vec<usize>,
}

impl SubsetSampler {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }
}

impl Sampler for SubsetSampler {
    fn indices(&self, _epoch: usize) -> Vec<usize> {
        self.indices.clone()
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Visits a fixed subset of indices in a fresh random order each epoch.
///
/// The order is a pure function of `(seed, epoch)`, so a resumed run sees the
/// same batches as an uninterrupted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetRandomSampler {
    indices: Vec<usize>,
    seed: u64,
}

impl SubsetRandomSampler {
    pub fn new(indices: Vec<usize>, seed: u64) -> Self {
        Self { indices, seed }
    }
}

impl Sampler for SubsetRandomSampler {
    fn indices(&self, epoch: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
        let mut order = self.indices.clone();
        order.shuffle(&mut rng);
        order
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Split `0..len` into disjoint train and validation index sets.
///
/// With a seed the indices are shuffled before splitting; without one the
/// last `val_len` indices form the validation set. `val_len` is clamped to
/// `len`.
pub fn train_val_split(len: usize, val_len: usize, seed: Option<u64>) -> (Vec<usize>, Vec<usize>) {
    let mut all: Vec<usize> = (0..len).collect();
    if let Some(seed) = seed {
        all.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    let val = all.split_off(len - val_len.min(len));
    (all, val)
}
