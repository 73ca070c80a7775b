//! Tracing subscriber setup for programs driving a trainer.
//!
//! The library itself only emits `tracing` events; binaries call
//! [`init_logging`] once at startup.

use crate::config::LoggingConfig;
use crate::error::{Result, TrainError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Install the global subscriber: human-readable stderr output filtered by
/// `config.level`, plus daily-rotated JSON logs when `config.json_dir` is set.
///
/// The returned guard flushes the JSON writer on drop and must be held for
/// the lifetime of the program.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let stderr_filter = EnvFilter::try_new(&config.level)
        .map_err(|e| TrainError::config(format!("invalid log level `{}`: {e}", config.level)))?;
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let (json_layer, guard) = match &config.json_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "yews-train.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| TrainError::config(format!("logging already initialised: {e}")))?;

    Ok(guard)
}
