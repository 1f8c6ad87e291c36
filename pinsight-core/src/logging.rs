//! Logging for pinsight
//!
//! Summaries are usually requested from a terminal or a script, so nothing is
//! logged to stdout. Records go to `pinsight.log.<date>` under the XDG state
//! directory, one file per day.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "pinsight.log";

/// Install the global subscriber writing to the XDG state directory.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    init_in(&Config::state_dir(), config)
}

/// Same as [`init`], with an explicit log directory.
pub fn init_in(log_dir: &Path, config: &LoggingConfig) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (writer, guard) = tracing_appender::non_blocking(file_appender(log_dir, config.max_files)?);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(level_filter(&config.level)?)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Daily-rotating appender that keeps at most `max_files` files.
fn file_appender(log_dir: &Path, max_files: usize) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {e}")))
}

fn level_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| Error::Config(format!("invalid log level {level:?}: {e}")))
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background log writer alive; pending records are flushed on drop.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn log_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(LOG_FILE_PREFIX))
            .collect()
    }

    #[test]
    fn test_file_appender_writes_dated_file() {
        let dir = TempDir::new().unwrap();
        let mut appender = file_appender(dir.path(), 3).unwrap();
        appender.write_all(b"summary requested\n").unwrap();
        appender.flush().unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 1, "{files:?}");

        let contents = std::fs::read_to_string(dir.path().join(&files[0])).unwrap();
        assert_eq!(contents, "summary requested\n");
    }

    #[test]
    fn test_zero_max_files_still_logs() {
        let dir = TempDir::new().unwrap();
        let mut appender = file_appender(dir.path(), 0).unwrap();
        appender.write_all(b"x\n").unwrap();
        appender.flush().unwrap();
        assert_eq!(log_files(dir.path()).len(), 1);
    }

    #[test]
    fn test_level_filter_accepts_configured_level() {
        assert!(level_filter("debug").is_ok());
        assert!(level_filter("pinsight_core=trace,warn").is_ok());
    }

    #[test]
    fn test_init_in_fails_when_dir_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, b"").unwrap();

        let result = init_in(&blocker.join("logs"), &LoggingConfig::default());
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
