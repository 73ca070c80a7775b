//! Error types for the yews-train crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Top-level error type for training operations.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A recipe hook (`build_*` or `update_scheduler`) failed.
    #[error("Recipe hook `{hook}` failed: {message}")]
    Hook { hook: &'static str, message: String },

    #[error("Failed to load checkpoint {}: {reason}", path.display())]
    CheckpointLoad { path: PathBuf, reason: String },

    /// The run directory already exists; runs never overwrite each other.
    #[error("Run directory already exists: {}", path.display())]
    DirectoryConflict { path: PathBuf },

    #[error("State error: {0}")]
    State(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl TrainError {
    pub fn hook(hook: &'static str, message: impl Into<String>) -> Self {
        Self::Hook {
            hook,
            message: message.into(),
        }
    }

    pub fn checkpoint_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CheckpointLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The I/O error kind this error corresponds to, if any.
    ///
    /// A [`TrainError::DirectoryConflict`] reports `AlreadyExists` so callers
    /// can handle it alongside plain I/O failures.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io(e) => Some(e.kind()),
            Self::DirectoryConflict { .. } => Some(std::io::ErrorKind::AlreadyExists),
            _ => None,
        }
    }
}
