//! Datasets, index samplers and the batching loader.

pub mod dataset;
pub mod loader;
pub mod sampler;

pub use dataset::Dataset;
pub use loader::{DataLoader, LoaderOptions};
pub use sampler::{Sampler, SubsetRandomSampler, SubsetSampler, train_val_split};
