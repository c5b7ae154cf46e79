//! Logging setup for DeepZoom binaries.
//!
//! Library code only emits `tracing` events; applications pick a subscriber:
//! - [`init_logging`] writes to a log file (cleared per session) and stderr
//! - [`init_console_logging`] writes to stderr only
//!
//! `RUST_LOG` overrides the configured level in both cases.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the background log writer alive.
///
/// Dropping this guard flushes and closes the log file.
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

/// Initializes file and stderr logging.
///
/// Creates `log_dir` if needed and truncates any previous log file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be cleared.
pub fn init_logging(log_dir: &Path, log_file: &str, level: &str) -> io::Result<LoggingGuard> {
    let path = prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path,
    })
}

/// Initializes stderr-only logging. Safe to call more than once; later
/// calls are ignored.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// `RUST_LOG` if set, else `level`, else `info`.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Creates the directory and empties the log file.
fn prepare_log_file(log_dir: &Path, log_file: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file);
    fs::write(&path, "")?;
    Ok(path)
}

/// ~/.deepzoom/logs
pub fn default_log_dir() -> PathBuf {
    crate::config::config_directory().join("logs")
}

pub fn default_log_file() -> &'static str {
    "deepzoom.log"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_paths() {
        assert_eq!(default_log_file(), "deepzoom.log");
        assert!(default_log_dir().ends_with("logs"));
    }

    #[test]
    fn test_prepare_creates_nested_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("deep").join("nested");

        let path = prepare_log_file(&dir, "test.log").unwrap();

        assert!(dir.exists());
        assert_eq!(path, dir.join("test.log"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_prepare_clears_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.log");
        fs::write(&path, "old log data").unwrap();

        prepare_log_file(temp.path(), "test.log").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_prepare_fails_when_directory_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        assert!(prepare_log_file(&blocker, "test.log").is_err());
    }

    #[test]
    fn test_guard_reports_path() {
        use tracing_appender::non_blocking::NonBlocking;

        let (writer, guard) = NonBlocking::new(io::sink());
        drop(writer);
        let logging = LoggingGuard {
            _file_guard: guard,
            path: PathBuf::from("logs/deepzoom.log"),
        };
        assert_eq!(logging.path(), Path::new("logs/deepzoom.log"));
    }
}
