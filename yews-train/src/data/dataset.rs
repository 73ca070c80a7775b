//! Indexable collections of examples.

use crate::error::{Result, TrainError};

/// An indexable, read-only collection of examples.
///
/// Datasets are shared between the trainer and loader worker threads, so
/// they must be `Sync` and hand out owned items.
pub trait Dataset: Sync {
    type Item: Send;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<Self::Item>;
}

impl<T: Clone + Send + Sync> Dataset for Vec<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Result<T> {
        self.as_slice().get(index).cloned().ok_or_else(|| {
            TrainError::data(format!(
                "index {index} out of range for dataset of {} examples",
                self.as_slice().len()
            ))
        })
    }
}
