//! Stateless building blocks the trainer is assembled from: device
//! placement, single training and validation passes, checkpoint
//! serialization, run naming and directory cleanup.

use crate::checkpoint::{Checkpoint, best_model_path};
use crate::config::RunNaming;
use crate::data::{DataLoader, Dataset};
use crate::device::{Device, Placement};
use crate::error::{Result, TrainError};
use crate::metrics::{AverageMeter, EpochStats};
use crate::nn::{Criterion, Model, Optimizer};
use crate::persistence::atomic_write_json;
use chrono::Utc;
use std::path::Path;
use tracing::{debug, info};

/// Resolve `placement` against the model's devices and move the model there.
///
/// Returns the devices in use, primary first.
pub fn place_model<M: Model>(model: &mut M, placement: &Placement) -> Result<Vec<Device>> {
    let devices = placement.resolve(&model.available_devices())?;
    move_to(model, &devices)?;
    Ok(devices)
}

/// Move a model onto one device, or fan it out over several.
pub fn move_to<M: Model>(model: &mut M, devices: &[Device]) -> Result<()> {
    match devices {
        [] => Err(TrainError::device("no device to move the model to")),
        [device] => model.to_device(device),
        _ => model.to_devices(devices),
    }
}

/// Run one training epoch: for every batch, compute the gradient and apply
/// an optimizer step.
///
/// Loss and accuracy are averaged over samples, not batches.
pub fn train_epoch<M, C, O, D>(
    model: &mut M,
    loader: DataLoader<'_, D>,
    criterion: &C,
    optimizer: &mut O,
    epoch: usize,
    print_freq: Option<usize>,
) -> Result<EpochStats>
where
    D: Dataset,
    M: Model<Sample = D::Item>,
    C: Criterion<M>,
    O: Optimizer<M>,
{
    let mut losses = AverageMeter::new();
    let mut top1 = AverageMeter::new();
    let num_batches = loader.num_batches();

    model.set_training(true);
    for (i, batch) in loader.enumerate() {
        let batch = batch?;
        let (outcome, gradient) = criterion.backward(model, &batch)?;
        optimizer.step(model, gradient)?;

        losses.update(outcome.loss, outcome.count);
        top1.update(outcome.accuracy(), outcome.count);

        if should_report(i, print_freq) {
            info!(
                epoch,
                batch = i,
                num_batches,
                loss = losses.last,
                loss_avg = losses.avg(),
                acc = top1.last,
                acc_avg = top1.avg(),
                "Train"
            );
        }
    }

    Ok(EpochStats {
        accuracy: top1.avg(),
        loss: losses.avg(),
    })
}

/// Run one evaluation pass without touching the model's weights.
pub fn validate<M, C, D>(
    model: &mut M,
    loader: DataLoader<'_, D>,
    criterion: &C,
    print_freq: Option<usize>,
) -> Result<EpochStats>
where
    D: Dataset,
    M: Model<Sample = D::Item>,
    C: Criterion<M>,
{
    let mut losses = AverageMeter::new();
    let mut top1 = AverageMeter::new();
    let num_batches = loader.num_batches();

    model.set_training(false);
    for (i, batch) in loader.enumerate() {
        let batch = batch?;
        let outcome = criterion.evaluate(model, &batch)?;

        losses.update(outcome.loss, outcome.count);
        top1.update(outcome.accuracy(), outcome.count);

        if should_report(i, print_freq) {
            info!(
                batch = i,
                num_batches,
                loss = losses.last,
                loss_avg = losses.avg(),
                acc = top1.last,
                acc_avg = top1.avg(),
                "Validate"
            );
        }
    }

    let stats = EpochStats {
        accuracy: top1.avg(),
        loss: losses.avg(),
    };
    info!(acc = stats.accuracy, loss = stats.loss, "Validation pass complete");
    Ok(stats)
}

fn should_report(batch: usize, print_freq: Option<usize>) -> bool {
    matches!(print_freq, Some(freq) if freq > 0 && batch % freq == 0)
}

/// Write a checkpoint to `path`.
///
/// A record flagged best is also copied to `model_best.json` next to it.
/// Write failures propagate.
pub fn save_checkpoint(record: &Checkpoint, path: &Path) -> Result<()> {
    atomic_write_json(path, record)?;
    debug!(path = %path.display(), epoch = record.epoch, "Checkpoint written");

    if record.is_best() {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let best = best_model_path(dir);
        std::fs::copy(path, &best)?;
        debug!(path = %best.display(), epoch = record.epoch, "Best model updated");
    }
    Ok(())
}

/// Read a checkpoint from `path`.
///
/// Missing and unparsable files both yield [`TrainError::CheckpointLoad`].
pub fn load_checkpoint(path: &Path) -> Result<Checkpoint> {
    let bytes = std::fs::read(path).map_err(|e| TrainError::checkpoint_load(path, e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TrainError::checkpoint_load(path, e.to_string()))
}

/// Generate a fresh run name for `arch`. Every call returns a new name.
pub fn generate_run_name(arch: &str, naming: RunNaming) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    match naming {
        RunNaming::Random => format!("{arch}-{id}"),
        RunNaming::Timestamped => format!(
            "{arch}-{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            &id[..8]
        ),
    }
}

/// Delete every entry under `dir`, keeping `dir` itself.
///
/// A missing `dir` is not an error.
pub fn remove_dir_contents(dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    debug!(dir = %dir.display(), "Directory contents removed");
    Ok(())
}
