//! Batching iterator over a sampled dataset.

use crate::data::dataset::Dataset;
use crate::data::sampler::Sampler;
use crate::error::{Result, TrainError};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

/// Batch size and worker count of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Size of the thread pool fetching examples of a batch in parallel.
    /// `0` and `1` both fetch on the calling thread.
    pub num_workers: usize,
}

impl LoaderOptions {
    pub fn new(batch_size: usize, num_workers: usize) -> Self {
        Self {
            batch_size,
            num_workers,
        }
    }
}

/// Iterator of batches drawn from `dataset` in sampler order.
///
/// The final batch may be smaller than `batch_size`.
pub struct DataLoader<'a, D: Dataset> {
    dataset: &'a D,
    indices: Vec<usize>,
    options: LoaderOptions,
    cursor: usize,
    pool: Option<ThreadPool>,
}

impl<'a, D: Dataset> DataLoader<'a, D> {
    /// Build the loader for one epoch.
    pub fn new(
        dataset: &'a D,
        sampler: &dyn Sampler,
        epoch: usize,
        options: LoaderOptions,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(TrainError::data("batch size must be at least 1"));
        }
        let pool = if options.num_workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(options.num_workers)
                .thread_name(|i| format!("yews-loader-{i}"))
                .build()
                .map_err(|e| TrainError::data(format!("failed to start loader workers: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            dataset,
            indices: sampler.indices(epoch),
            options,
            cursor: 0,
            pool,
        })
    }

    /// Number of batches in one full pass.
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.options.batch_size)
    }

    fn fetch(&self, indices: &[usize]) -> Result<Vec<D::Item>> {
        let dataset = self.dataset;
        match &self.pool {
            Some(pool) if indices.len() > 1 => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| dataset.get(i))
                    .collect::<Result<Vec<_>>>()
            }),
            _ => indices.iter().map(|&i| dataset.get(i)).collect(),
        }
    }
}

impl<D: Dataset> Iterator for DataLoader<'_, D> {
    type Item = Result<Vec<D::Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.options.batch_size).min(self.indices.len());
        let batch = self.fetch(&self.indices[self.cursor..end]);
        self.cursor = end;
        // A failed fetch ends the pass.
        if batch.is_err() {
            self.cursor = self.indices.len();
        }
        Some(batch)
    }
}
