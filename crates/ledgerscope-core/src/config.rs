//! Configuration for the monitoring view.
//!
//! Each polled data source has its own interval, and the empirically-tuned
//! knobs of the calculators (the update-recency window used by the
//! activity detector) are configuration rather than hard-coded constants.
//! Loaded from a TOML file; every field has a default so a missing or
//! partial file still yields a working config.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::logging::LogConfig;

/// Top-level monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Base URL of the ingestion status service.
    pub endpoint: String,

    /// Poll interval for the full cursor list (seconds).
    pub cursor_poll_interval_secs: u64,

    /// Poll interval for aggregate counters (seconds).
    pub stats_poll_interval_secs: u64,

    /// Poll interval for the write-activity probe (seconds).
    pub activity_poll_interval_secs: u64,

    /// Poll interval for live-tailing status (seconds).
    pub live_poll_interval_secs: u64,

    /// How recently a non-complete cursor must have been updated to count
    /// as a write-activity signal (seconds).
    pub update_recency_window_secs: u64,

    /// Logging configuration.
    pub log: LogConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080".to_string(),
            cursor_poll_interval_secs: 10,
            stats_poll_interval_secs: 15,
            activity_poll_interval_secs: 20,
            live_poll_interval_secs: 10,
            update_recency_window_secs: 300,
            log: LogConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants not expressible in the type.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError("endpoint must not be empty".into()).into());
        }
        for (name, secs) in [
            ("cursor_poll_interval_secs", self.cursor_poll_interval_secs),
            ("stats_poll_interval_secs", self.stats_poll_interval_secs),
            (
                "activity_poll_interval_secs",
                self.activity_poll_interval_secs,
            ),
            ("live_poll_interval_secs", self.live_poll_interval_secs),
            (
                "update_recency_window_secs",
                self.update_recency_window_secs,
            ),
        ] {
            if secs == 0 {
                return Err(
                    ConfigError::ValidationError(format!("{name} must be positive")).into(),
                );
            }
        }
        Ok(())
    }

    pub fn cursor_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cursor_poll_interval_secs)
    }

    pub fn stats_poll_interval(&self) -> Duration {
        Duration::from_secs(self.stats_poll_interval_secs)
    }

    pub fn activity_poll_interval(&self) -> Duration {
        Duration::from_secs(self.activity_poll_interval_secs)
    }

    pub fn live_poll_interval(&self) -> Duration {
        Duration::from_secs(self.live_poll_interval_secs)
    }

    pub fn update_recency_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.update_recency_window_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cursor_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.update_recency_window(), TimeDelta::minutes(5));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: MonitorConfig =
            toml::from_str("endpoint = \"http://ledger-status:9000\"").unwrap();
        assert_eq!(config.endpoint, "http://ledger-status:9000");
        assert_eq!(config.stats_poll_interval_secs, 15);
    }

    #[test]
    fn empty_endpoint_rejected() {
        let config = MonitorConfig {
            endpoint: "  ".into(),
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let config = MonitorConfig {
            cursor_poll_interval_secs: 0,
            ..MonitorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cursor_poll_interval_secs"));

        let config = MonitorConfig {
            update_recency_window_secs: 0,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let err = MonitorConfig::load(Path::new("/nonexistent/lscope.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "endpoint = \"http://host:1234\"\ncursor_poll_interval_secs = 3"
        )
        .unwrap();
        let config = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(config.endpoint, "http://host:1234");
        assert_eq!(config.cursor_poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "live_poll_interval_secs = 0").unwrap();
        assert!(MonitorConfig::load(file.path()).is_err());
    }

    #[test]
    fn load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint = [not toml").unwrap();
        let err = MonitorConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Config(ConfigError::ParseFailed(_))
        ));
    }
}
