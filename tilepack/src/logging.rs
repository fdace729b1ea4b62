//! Logging setup.
//!
//! - Writes to `<log_dir>/<log_file>` (cleared on session start)
//! - Mirrors to stderr so stdout stays free for command output
//! - Filter configurable via `RUST_LOG` (defaults to `info`)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{config_directory, DEFAULT_LOG_FILE};

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping it flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    /// The log file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Initialize the global subscriber.
///
/// Creates `log_dir` if needed and truncates the previous log file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the log file
/// cannot be cleared.
pub fn init_logging(log_dir: &Path, log_file: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    let log_path = log_dir.join(log_file);
    fs::write(&log_path, "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path: log_path,
    })
}

/// Default log directory (`~/.tilepack/logs`).
pub fn default_log_dir() -> PathBuf {
    config_directory().join("logs")
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    DEFAULT_LOG_FILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert!(default_log_dir().ends_with(".tilepack/logs"));
        assert_eq!(default_log_file(), "tilepack.log");
    }

    // Only one test may install the global subscriber
    #[test]
    fn test_creates_directory_and_truncates_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        fs::create_dir_all(&log_dir).unwrap();
        fs::write(log_dir.join("test.log"), "previous session").unwrap();

        let guard = init_logging(&log_dir, "test.log").unwrap();

        assert!(log_dir.is_dir());
        assert_eq!(guard.path(), log_dir.join("test.log"));
        assert!(!fs::read_to_string(guard.path())
            .unwrap()
            .contains("previous session"));
    }
}
