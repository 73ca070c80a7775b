//! Checkpoint and results records, their on-disk layout, and the per-run
//! checkpoint manifest.

use crate::error::Result;
use crate::nn::StateDict;
use crate::persistence::{atomic_write_json, load_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const CHECKPOINT_EXT: &str = "json";
pub const MANIFEST_FILE: &str = "checkpoints.json";
pub const BEST_MODEL_FILE: &str = "model_best.json";

/// Extra checkpoint field flagging the best model so far.
pub const IS_BEST: &str = "is_best";

const CORE_FIELDS: [&str; 6] = ["epoch", "arch", "best_acc", "model", "optimizer", "scheduler"];

/// Point-in-time snapshot of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the last completed epoch.
    pub epoch: usize,
    pub arch: String,
    pub best_acc: f64,
    pub model: StateDict,
    pub optimizer: StateDict,
    pub scheduler: StateDict,
    /// Caller-supplied fields such as [`IS_BEST`].
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Checkpoint {
    /// Merge caller-supplied fields into the record.
    ///
    /// Fields that would shadow a core field are dropped.
    pub fn with_extras(mut self, extras: Map<String, Value>) -> Self {
        for (key, value) in extras {
            if CORE_FIELDS.contains(&key.as_str()) {
                tracing::warn!(field = %key, "Ignoring checkpoint extra that shadows a core field");
                continue;
            }
            self.extra.insert(key, value);
        }
        self
    }

    pub fn is_best(&self) -> bool {
        self.extra
            .get(IS_BEST)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Final model state plus the metric sequences of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResults {
    pub model: StateDict,
    pub train_loss: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_acc: Vec<f64>,
}

/// `<run_dir>/checkpoint_epoch<epoch>.json`
pub fn checkpoint_path(run_dir: &Path, epoch: usize) -> PathBuf {
    run_dir.join(format!("checkpoint_epoch{epoch}.{CHECKPOINT_EXT}"))
}

/// `<run_dir>/results_<arch>_epoch<epochs>.json`
pub fn results_path(run_dir: &Path, arch: &str, epochs: usize) -> PathBuf {
    run_dir.join(format!("results_{arch}_epoch{epochs}.{CHECKPOINT_EXT}"))
}

/// `<dir>/model_best.json`
pub fn best_model_path(dir: &Path) -> PathBuf {
    dir.join(BEST_MODEL_FILE)
}

/// One preserved checkpoint as listed in the run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub epoch: usize,
    pub path: PathBuf,
    pub is_best: bool,
    /// SHA-256 of the file contents.
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl CheckpointEntry {
    /// Describe a checkpoint file that has just been written.
    pub fn for_file(epoch: usize, path: &Path, is_best: bool) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(Self {
            epoch,
            path: path.to_path_buf(),
            is_best,
            hash: hash_bytes(&content),
            size_bytes: content.len() as u64,
            created_at: Utc::now(),
        })
    }
}

/// Index of the checkpoints preserved in one run directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub checkpoints: Vec<CheckpointEntry>,
}

impl CheckpointManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the manifest of `run_dir`; an absent manifest is empty.
    pub fn load(run_dir: &Path) -> Result<Self> {
        Ok(load_json(&run_dir.join(MANIFEST_FILE))?.unwrap_or_default())
    }

    /// Save the manifest into `run_dir` (atomic write).
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        atomic_write_json(&run_dir.join(MANIFEST_FILE), self)?;
        Ok(())
    }

    /// Add an entry, replacing any earlier entry for the same epoch.
    pub fn record(&mut self, entry: CheckpointEntry) {
        self.checkpoints.retain(|c| c.epoch != entry.epoch);
        self.checkpoints.push(entry);
    }

    /// Checkpoint with the highest epoch.
    pub fn latest(&self) -> Option<&CheckpointEntry> {
        self.checkpoints.iter().max_by_key(|c| c.epoch)
    }

    pub fn list(&self) -> &[CheckpointEntry] {
        &self.checkpoints
    }
}

/// Compute SHA-256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
