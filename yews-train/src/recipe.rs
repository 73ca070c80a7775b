//! The architecture-specific half of a trainer.

use crate::error::Result;
use crate::nn::{Criterion, Model, Optimizer, Scheduler};

/// Builds and steers everything architecture specific.
///
/// A [`Trainer`](crate::Trainer) composes exactly one recipe. Every hook is
/// required; all `build_*` hooks run when the trainer is constructed and on
/// every [`reset`](crate::Trainer::reset), so a failing recipe is reported
/// before any training starts.
pub trait Recipe {
    type Model: Model;
    type Criterion: Criterion<Self::Model>;
    type Optimizer: Optimizer<Self::Model>;
    type Scheduler: Scheduler;

    /// Architecture tag, stored in checkpoints and used in run names.
    fn arch(&self) -> &str;

    fn build_model(&self) -> Result<Self::Model>;

    fn build_criterion(&self) -> Result<Self::Criterion>;

    fn build_optimizer(&self, model: &Self::Model) -> Result<Self::Optimizer>;

    fn build_scheduler(&self, optimizer: &Self::Optimizer) -> Result<Self::Scheduler>;

    /// Advance the learning-rate schedule before training epoch `epoch`.
    fn update_scheduler(
        &self,
        scheduler: &mut Self::Scheduler,
        optimizer: &mut Self::Optimizer,
        epoch: usize,
    ) -> Result<()>;
}
