//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pinsight/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pinsight/` (~/.config/pinsight/)
//! - Data: `$XDG_DATA_HOME/pinsight/` (~/.local/share/pinsight/)
//! - State/Logs: `$XDG_STATE_HOME/pinsight/` (~/.local/state/pinsight/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides the event store location.
pub const DATABASE_ENV_VAR: &str = "PINSIGHT_DATABASE";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Event store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Summary assembly configuration
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Database file. Falls back to `$PINSIGHT_DATABASE`, then the XDG data dir.
    pub path: Option<PathBuf>,

    /// How long SQLite waits on a locked database before failing
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl StoreConfig {
    /// Resolve the database path: explicit config, then env var, then XDG default.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        std::env::var_os(DATABASE_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(Config::database_path)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Summary assembly configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    /// Trailing window (days) for the events-over-time series
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Deadline covering the empty check and all eight aggregations
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,

    /// Filter every aggregation to events at or before one captured instant
    #[serde(default)]
    pub consistent_snapshot: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            deadline_ms: default_deadline(),
            consistent_snapshot: false,
        }
    }
}

impl SummaryConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.window_days == 0 {
            return Err(Error::Config(
                "summary.window_days must be at least 1".to_string(),
            ));
        }
        if self.deadline_ms == 0 {
            return Err(Error::Config(
                "summary.deadline_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_window_days() -> u32 {
    7
}

fn default_deadline() -> u64 {
    10_000
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.summary.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pinsight/config.toml` (~/.config/pinsight/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pinsight").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite event store)
    ///
    /// `$XDG_DATA_HOME/pinsight/` (~/.local/share/pinsight/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("pinsight")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/pinsight/` (~/.local/state/pinsight/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pinsight")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/pinsight/events.db` (~/.local/share/pinsight/events.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("events.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pinsight/pinsight.log` (~/.local/state/pinsight/pinsight.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pinsight.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.store.path.is_none());
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.summary.window_days, 7);
        assert_eq!(config.summary.deadline_ms, 10_000);
        assert!(!config.summary.consistent_snapshot);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[store]
path = "/tmp/pinsight-test/events.db"
busy_timeout_ms = 250

[summary]
window_days = 14
deadline_ms = 2000
consistent_snapshot = true

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.store.resolved_path(),
            PathBuf::from("/tmp/pinsight-test/events.db")
        );
        assert_eq!(config.store.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.summary.window_days, 14);
        assert_eq!(config.summary.deadline(), Duration::from_secs(2));
        assert!(config.summary.consistent_snapshot);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_summary_config_validation() {
        let config = SummaryConfig {
            window_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SummaryConfig {
            deadline_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[summary]\nwindow_days = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_database_path_layout() {
        assert!(Config::database_path().ends_with("pinsight/events.db"));
        assert!(Config::log_path().ends_with("pinsight/pinsight.log"));
    }
}
