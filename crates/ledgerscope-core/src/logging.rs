//! Structured logging for ledgerscope.
//!
//! `tracing` with configurable output format and destination:
//!
//! - **Pretty format**: human-friendly output for interactive use
//! - **JSON format**: machine-parseable lines for CI/ops
//! - **File output**: optional log file alongside stderr
//!
//! Initialization is guarded so repeated calls (tests, embedded use) are
//! no-ops rather than panics. Use consistent correlation fields in spans
//! and events: `task` (poll task name), `cursor_id`, `migration`,
//! `after_seq` (change-feed position).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::Result;

/// Global flag to track if logging has been initialized.
static LOGGING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error).
    /// Can be overridden by RUST_LOG.
    pub level: String,

    /// Output format (pretty or json).
    pub format: LogFormat,

    /// Optional path to a log file written in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Initialize the global tracing subscriber. Idempotent: only the first
/// call installs anything.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer: Box<dyn Layer<_> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let file_layer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::error::Error::Runtime(format!("failed to init logging: {e}")))?;

    let _ = LOGGING_INITIALIZED.set(true);
    Ok(())
}
