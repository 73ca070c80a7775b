//! Configuration system for yews training runs.
//!
//! Uses `figment` for layered configuration: defaults -> TOML file ->
//! `YEWS_`-prefixed environment variables.

use crate::data::LoaderOptions;
use crate::device::Placement;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YewsConfig {
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub train: TrainOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings fixed for the lifetime of a trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Root directory holding one subdirectory per run.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub run_naming: RunNaming,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            placement: Placement::default(),
            run_naming: RunNaming::default(),
        }
    }
}

impl TrainerConfig {
    pub fn with_tmp_dir(tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
            ..Self::default()
        }
    }
}

fn default_tmp_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "yews", "yews")
        .map(|d| d.cache_dir().join("tmp"))
        .unwrap_or_else(|| std::env::temp_dir().join("yews"))
}

/// How run directory names are generated from the architecture tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunNaming {
    /// `<arch>-<uuid>`
    #[default]
    Random,
    /// `<arch>-<YYYYmmdd-HHMMSS>-<8 hex chars>`
    Timestamped,
}

/// Where epoch indexing starts when a run resumes from a checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochOrigin {
    /// Run epochs `start_epoch..epochs`; a resumed run picks up after the
    /// checkpoint's epoch.
    #[default]
    Continue,
    /// Run epochs `0..epochs` even after resuming.
    Restart,
}

/// Parameters of one `Trainer::train` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_val_batch_size")]
    pub val_batch_size: usize,
    #[serde(default = "default_val_num_workers")]
    pub val_num_workers: usize,
    #[serde(default = "default_train_batch_size")]
    pub train_batch_size: usize,
    #[serde(default = "default_train_num_workers")]
    pub train_num_workers: usize,
    /// Checkpoint to resume from before training.
    #[serde(default)]
    pub resume: Option<PathBuf>,
    /// Log progress every `print_freq` batches; `None` disables it.
    #[serde(default = "default_print_freq")]
    pub print_freq: Option<usize>,
    /// Write a checkpoint into the run directory after every epoch.
    #[serde(default = "default_true")]
    pub save_tmp: bool,
    #[serde(default)]
    pub epoch_origin: EpochOrigin,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            val_batch_size: default_val_batch_size(),
            val_num_workers: default_val_num_workers(),
            train_batch_size: default_train_batch_size(),
            train_num_workers: default_train_num_workers(),
            resume: None,
            print_freq: default_print_freq(),
            save_tmp: true,
            epoch_origin: EpochOrigin::default(),
        }
    }
}

impl TrainOptions {
    pub fn train_loader(&self) -> LoaderOptions {
        LoaderOptions::new(self.train_batch_size, self.train_num_workers)
    }

    pub fn val_loader(&self) -> LoaderOptions {
        LoaderOptions::new(self.val_batch_size, self.val_num_workers)
    }
}

fn default_epochs() -> usize {
    100
}

fn default_val_batch_size() -> usize {
    1000
}

fn default_val_num_workers() -> usize {
    4
}

fn default_train_batch_size() -> usize {
    100
}

fn default_train_num_workers() -> usize {
    8
}

fn default_print_freq() -> Option<usize> {
    Some(10)
}

fn default_true() -> bool {
    true
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive for the stderr layer.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily-rotated JSON logs; disabled when unset.
    #[serde(default)]
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`YEWS_TRAIN__EPOCHS`, `YEWS_TRAINER__TMP_DIR`, ...)
/// 2. The TOML file at `path`, if given and present
/// 3. Built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<YewsConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(YewsConfig::default()));

    if let Some(path) = path {
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
    }

    figment = figment.merge(Env::prefixed("YEWS_").split("__"));

    figment.extract().map_err(Box::new)
}
