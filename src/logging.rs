//! Logging goes to a file, the terminal belongs to the table.
//!
//! `RUST_LOG` takes precedence over the configured level when set.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::RVError;

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or `rview=trace`.
    pub level: String,
    pub log_file: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: std::env::temp_dir().join("rview.log"),
        }
    }
}

pub fn build_env_filter(level: &str) -> Result<EnvFilter, RVError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| RVError::LoggingFailed(format!("invalid log level {level:?}: {e}"))),
    }
}

/// Install the global subscriber. Fails when the file cannot be opened or a
/// subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<(), RVError> {
    let filter = build_env_filter(&config.level)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .map_err(|e| RVError::LoggingFailed(format!("{}: {e}", config.log_file.display())))?;

    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| RVError::LoggingFailed(e.to_string()))
}
