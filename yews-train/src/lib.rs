//! # yews-train: epoch-driven training loop controller
//!
//! Coordinates epoch iteration, validation, metric tracking, checkpoint
//! persistence and resumption, and best-model selection for supervised
//! models. Everything architecture specific (model, loss, optimizer,
//! learning-rate policy) comes from a [`Recipe`]; the numerical work happens
//! behind the traits in [`nn`].
//!
//! ```text
//! Trainer::new ──► reset ──► (resume_checkpoint) ──► train
//!                                                     │
//!          baseline validate ◄─────────────────────────┘
//!                 │
//!                 ▼
//!   ┌─► update_scheduler ─► train_epoch ─► validate ─► preserve_checkpoint ─┐
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod functional;
pub mod logging;
pub mod metrics;
pub mod nn;
pub mod persistence;
pub mod recipe;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointManifest, TrainingResults};
pub use config::{EpochOrigin, RunNaming, TrainOptions, TrainerConfig, YewsConfig, load_config};
pub use data::{
    DataLoader, Dataset, LoaderOptions, Sampler, SubsetRandomSampler, SubsetSampler,
    train_val_split,
};
pub use device::{Device, Placement};
pub use error::{Result, TrainError};
pub use metrics::{EpochStats, History};
pub use nn::{BatchOutcome, Criterion, Model, Optimizer, Scheduler, StateDict, Stateful};
pub use recipe::Recipe;
pub use trainer::{ResumeOutcome, Trainer};
