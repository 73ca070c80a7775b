//! The training-loop controller.
//!
//! A [`Trainer`] owns one model together with its criterion, optimizer and
//! scheduler (all built by a [`Recipe`]), reads a shared dataset through two
//! samplers, and drives:
//!
//! `construct -> (resume) -> prepare run dir -> baseline validation ->
//! {update schedule -> train epoch -> validate -> checkpoint}* -> done`
//!
//! Any error aborts the current call. The last checkpoint written to the run
//! directory is the durable recovery point.

use crate::checkpoint::{
    Checkpoint, CheckpointEntry, CheckpointManifest, IS_BEST, TrainingResults, best_model_path,
    checkpoint_path, results_path,
};
use crate::config::{EpochOrigin, TrainOptions, TrainerConfig};
use crate::data::{DataLoader, Dataset, LoaderOptions, Sampler};
use crate::device::{Device, Placement};
use crate::error::{Result, TrainError};
use crate::functional;
use crate::metrics::{EpochStats, History};
use crate::nn::{Model, Optimizer, StateDict, Stateful};
use crate::persistence::atomic_write_json;
use crate::recipe::Recipe;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn};

/// What [`Trainer::resume_checkpoint`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// State was restored; training continues after `epoch`.
    Resumed { epoch: usize, arch_matches: bool },
    /// The checkpoint could not be read or its state was rejected. Nothing
    /// was changed.
    Skipped { path: PathBuf, reason: String },
}

impl ResumeOutcome {
    pub fn is_resumed(&self) -> bool {
        matches!(self, Self::Resumed { .. })
    }
}

struct Components<R: Recipe> {
    devices: Vec<Device>,
    model: R::Model,
    criterion: R::Criterion,
    optimizer: R::Optimizer,
    scheduler: R::Scheduler,
}

fn build_components<R: Recipe>(recipe: &R, placement: &Placement) -> Result<Components<R>> {
    let mut model = recipe.build_model()?;
    let devices = functional::place_model(&mut model, placement)?;
    let criterion = recipe.build_criterion()?;
    let optimizer = recipe.build_optimizer(&model)?;
    let scheduler = recipe.build_scheduler(&optimizer)?;
    Ok(Components {
        devices,
        model,
        criterion,
        optimizer,
        scheduler,
    })
}

/// Epoch-driven training controller.
pub struct Trainer<R, D>
where
    R: Recipe,
    D: Dataset<Item = <R::Model as Model>::Sample>,
{
    recipe: R,
    config: TrainerConfig,
    dataset: Arc<D>,
    train_sampler: Box<dyn Sampler>,
    val_sampler: Box<dyn Sampler>,

    devices: Vec<Device>,
    model: R::Model,
    criterion: R::Criterion,
    optimizer: R::Optimizer,
    scheduler: R::Scheduler,

    start_epoch: usize,
    end_epoch: usize,
    history: History,
    best_acc: f64,
    best_model: Option<PathBuf>,
    run_name: String,
}

impl<R, D> Trainer<R, D>
where
    R: Recipe,
    D: Dataset<Item = <R::Model as Model>::Sample>,
{
    /// Build a trainer. Every recipe hook except `update_scheduler` runs
    /// here, so a broken recipe fails before any data is touched.
    pub fn new(
        recipe: R,
        dataset: Arc<D>,
        train_sampler: impl Sampler + 'static,
        val_sampler: impl Sampler + 'static,
        config: TrainerConfig,
    ) -> Result<Self> {
        let parts = build_components(&recipe, &config.placement)?;
        let run_name = functional::generate_run_name(recipe.arch(), config.run_naming);
        info!(
            arch = recipe.arch(),
            run = %run_name,
            device = %parts.devices[0],
            train_samples = train_sampler.len(),
            val_samples = val_sampler.len(),
            "Trainer created"
        );

        Ok(Self {
            recipe,
            config,
            dataset,
            train_sampler: Box::new(train_sampler),
            val_sampler: Box::new(val_sampler),
            devices: parts.devices,
            model: parts.model,
            criterion: parts.criterion,
            optimizer: parts.optimizer,
            scheduler: parts.scheduler,
            start_epoch: 0,
            end_epoch: 0,
            history: History::new(),
            best_acc: 0.0,
            best_model: None,
            run_name,
        })
    }

    /// Rebuild model, criterion, optimizer and scheduler from the recipe,
    /// clear all results and draw a fresh run name.
    ///
    /// Touches nothing on disk. If a hook fails the trainer is left as it was.
    pub fn reset(&mut self) -> Result<()> {
        let parts = build_components(&self.recipe, &self.config.placement)?;
        self.devices = parts.devices;
        self.model = parts.model;
        self.criterion = parts.criterion;
        self.optimizer = parts.optimizer;
        self.scheduler = parts.scheduler;

        self.start_epoch = 0;
        self.end_epoch = 0;
        self.history.clear();
        self.best_acc = 0.0;
        self.best_model = None;
        self.run_name = functional::generate_run_name(self.recipe.arch(), self.config.run_naming);

        info!(arch = self.recipe.arch(), run = %self.run_name, "Trainer reset");
        Ok(())
    }

    /// Restore epoch counter, best accuracy and model/optimizer/scheduler
    /// state from a checkpoint.
    ///
    /// An unreadable checkpoint is not an error: one warning is logged,
    /// nothing changes and [`ResumeOutcome::Skipped`] is returned. The same
    /// holds when the model, optimizer or scheduler rejects its state; any
    /// state already applied is rolled back first. A checkpoint from another
    /// architecture is applied anyway, with a warning.
    pub fn resume_checkpoint(&mut self, path: impl AsRef<Path>) -> Result<ResumeOutcome> {
        let path = path.as_ref();
        let checkpoint = match functional::load_checkpoint(path) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint not loaded, continuing without it");
                return Ok(ResumeOutcome::Skipped {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let previous = (
            self.model.state_dict()?,
            self.optimizer.state_dict()?,
            self.scheduler.state_dict()?,
        );
        if let Err(e) = self.load_states(checkpoint.model, checkpoint.optimizer, checkpoint.scheduler) {
            self.load_states(previous.0, previous.1, previous.2)?;
            warn!(path = %path.display(), error = %e, "Checkpoint state rejected, continuing without it");
            return Ok(ResumeOutcome::Skipped {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }

        let arch_matches = checkpoint.arch == self.recipe.arch();
        if !arch_matches {
            warn!(
                checkpoint_arch = %checkpoint.arch,
                arch = self.recipe.arch(),
                "Checkpoint architecture differs, loaded its state anyway"
            );
        }

        self.start_epoch = checkpoint.epoch + 1;
        self.best_acc = checkpoint.best_acc;

        info!(
            path = %path.display(),
            epoch = checkpoint.epoch,
            best_acc = checkpoint.best_acc,
            "Resumed from checkpoint"
        );
        Ok(ResumeOutcome::Resumed {
            epoch: checkpoint.epoch,
            arch_matches,
        })
    }

    fn load_states(
        &mut self,
        model: StateDict,
        optimizer: StateDict,
        scheduler: StateDict,
    ) -> Result<()> {
        self.model.load_state_dict(model)?;
        self.optimizer.load_state_dict(optimizer)?;
        self.scheduler.load_state_dict(scheduler)
    }

    /// Write a checkpoint for `epoch` into the run directory, plus any
    /// caller-supplied fields. With `is_best: true` among the extras the
    /// checkpoint also becomes the run's best-model snapshot.
    pub fn preserve_checkpoint(
        &mut self,
        epoch: usize,
        extras: Map<String, Value>,
    ) -> Result<PathBuf> {
        let run_dir = self.run_dir();
        let record = Checkpoint {
            epoch,
            arch: self.recipe.arch().to_string(),
            best_acc: self.best_acc,
            model: self.model.state_dict()?,
            optimizer: self.optimizer.state_dict()?,
            scheduler: self.scheduler.state_dict()?,
            extra: Map::new(),
        }
        .with_extras(extras);

        let path = checkpoint_path(&run_dir, epoch);
        functional::save_checkpoint(&record, &path)?;

        let is_best = record.is_best();
        let mut manifest = CheckpointManifest::load(&run_dir)?;
        manifest.record(CheckpointEntry::for_file(epoch, &path, is_best)?);
        manifest.save(&run_dir)?;

        if is_best {
            self.best_model = Some(best_model_path(&run_dir));
        }
        Ok(path)
    }

    /// Path of the newest checkpoint preserved in the current run.
    pub fn latest_checkpoint(&self) -> Result<Option<PathBuf>> {
        let manifest = CheckpointManifest::load(&self.run_dir())?;
        Ok(manifest.latest().map(|entry| entry.path.clone()))
    }

    /// Delete everything under the temp root, every run included.
    pub fn cleanup(&mut self) -> Result<()> {
        functional::remove_dir_contents(&self.config.tmp_dir)?;
        self.best_model = None;
        info!(dir = %self.config.tmp_dir.display(), "Temporary runs removed");
        Ok(())
    }

    /// Delete the current run's directory and everything in it.
    pub fn clean(&mut self) -> Result<()> {
        let run_dir = self.run_dir();
        functional::remove_dir_contents(&run_dir)?;
        match std::fs::remove_dir(&run_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.best_model = None;
        info!(dir = %run_dir.display(), "Run directory removed");
        Ok(())
    }

    /// Model state, taken on the CPU, plus the metric history.
    ///
    /// With `save` the results are also written to
    /// `<run_dir>/results_<arch>_epoch<epochs>.json`.
    pub fn results(&mut self, epochs: usize, save: bool) -> Result<TrainingResults> {
        self.model.to_device(&Device::Cpu)?;
        let model = self.model.state_dict();
        functional::move_to(&mut self.model, &self.devices)?;

        let results = TrainingResults {
            model: model?,
            train_loss: self.history.train_loss.clone(),
            train_acc: self.history.train_acc.clone(),
            val_loss: self.history.val_loss.clone(),
            val_acc: self.history.val_acc.clone(),
        };

        if save {
            let path = results_path(&self.run_dir(), self.recipe.arch(), epochs);
            atomic_write_json(&path, &results)?;
            info!(path = %path.display(), "Results saved");
        }
        Ok(results)
    }

    /// One evaluation pass over the validation subset. Bookkeeping is not
    /// touched.
    pub fn validate(
        &mut self,
        print_freq: Option<usize>,
        options: LoaderOptions,
    ) -> Result<EpochStats> {
        self.validation_pass(0, print_freq, options)
    }

    fn validation_pass(
        &mut self,
        epoch: usize,
        print_freq: Option<usize>,
        options: LoaderOptions,
    ) -> Result<EpochStats> {
        let loader = DataLoader::new(
            self.dataset.as_ref(),
            self.val_sampler.as_ref(),
            epoch,
            options,
        )?;
        functional::validate(&mut self.model, loader, &self.criterion, print_freq)
    }

    /// Run the training loop.
    ///
    /// The baseline validation pass is recorded only when the history holds
    /// no validation entry yet, so `val_*` stays one longer than `train_*`
    /// across repeated calls. With `save_tmp` the run directory must not
    /// exist yet.
    pub fn train(&mut self, options: &TrainOptions) -> Result<()> {
        let span = info_span!("train", arch = self.recipe.arch(), run = %self.run_name);
        let _enter = span.enter();

        if let Some(resume) = &options.resume {
            self.resume_checkpoint(resume)?;
        }

        if options.save_tmp {
            let run_dir = self.prepare_run_dir()?;
            info!(dir = %run_dir.display(), "Run directory created");
        }

        let train_options = options.train_loader();
        let val_options = options.val_loader();

        if self.history.val_acc.is_empty() {
            let baseline = self.validation_pass(0, options.print_freq, val_options)?;
            info!(acc = baseline.accuracy, loss = baseline.loss, "Baseline recorded");
            self.history.record_baseline(baseline);
        }

        let first_epoch = match options.epoch_origin {
            EpochOrigin::Continue => self.start_epoch,
            EpochOrigin::Restart => 0,
        };
        self.end_epoch = options.epochs;
        info!(first_epoch, epochs = options.epochs, "Training started");

        for epoch in first_epoch..options.epochs {
            self.recipe
                .update_scheduler(&mut self.scheduler, &mut self.optimizer, epoch)?;

            let loader = DataLoader::new(
                self.dataset.as_ref(),
                self.train_sampler.as_ref(),
                epoch,
                train_options,
            )?;
            let train = functional::train_epoch(
                &mut self.model,
                loader,
                &self.criterion,
                &mut self.optimizer,
                epoch,
                options.print_freq,
            )?;
            let val = self.validation_pass(epoch, options.print_freq, val_options)?;
            self.history.record_epoch(train, val);

            let is_best = val.accuracy > self.best_acc;
            self.best_acc = self.best_acc.max(val.accuracy);
            info!(
                epoch,
                train_acc = train.accuracy,
                train_loss = train.loss,
                val_acc = val.accuracy,
                val_loss = val.loss,
                best_acc = self.best_acc,
                is_best,
                lr = self.optimizer.learning_rate(),
                "Epoch complete"
            );

            if options.save_tmp {
                let mut extras = Map::new();
                extras.insert(IS_BEST.to_string(), Value::Bool(is_best));
                self.preserve_checkpoint(epoch, extras)?;
            }
        }

        info!(best_acc = self.best_acc, "Training finished");
        Ok(())
    }

    fn prepare_run_dir(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.tmp_dir)?;
        let run_dir = self.run_dir();
        match std::fs::create_dir(&run_dir) {
            Ok(()) => Ok(run_dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(TrainError::DirectoryConflict { path: run_dir })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn arch(&self) -> &str {
        self.recipe.arch()
    }

    pub fn recipe(&self) -> &R {
        &self.recipe
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.config.tmp_dir
    }

    /// `<tmp_dir>/<run_name>`
    pub fn run_dir(&self) -> PathBuf {
        self.config.tmp_dir.join(&self.run_name)
    }

    /// Primary compute device.
    pub fn device(&self) -> Device {
        self.devices[0]
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn best_acc(&self) -> f64 {
        self.best_acc
    }

    /// Best-model snapshot written by the current run, if any.
    pub fn best_model(&self) -> Option<&Path> {
        self.best_model.as_deref()
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn end_epoch(&self) -> usize {
        self.end_epoch
    }

    pub fn model(&self) -> &R::Model {
        &self.model
    }

    pub fn criterion(&self) -> &R::Criterion {
        &self.criterion
    }

    pub fn optimizer(&self) -> &R::Optimizer {
        &self.optimizer
    }

    pub fn scheduler(&self) -> &R::Scheduler {
        &self.scheduler
    }

    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }
}
