//! Worker log output.
//!
//! A fleet replica's primary sink is stdout: the container log collector
//! owns shipping and retention. An optional second sink keeps a local
//! day-by-day file history for debugging a single box without trawling
//! the collector. Both sinks emit compact single-line events so `grep`
//! and the collector's parser see one event per line; filtering comes
//! from `RUST_LOG` with an `info` default.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Prefix of rolled history files (`mobilepack.log.YYYY-MM-DD`).
const FILE_PREFIX: &str = "mobilepack.log";

/// Errors raised while setting up log output.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("cannot create log directory {dir}: {source}")]
    CreateDir { dir: PathBuf, source: io::Error },

    /// A global subscriber is already installed in this process.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Where log events go.
#[derive(Debug, Clone, Default)]
pub enum LogSink {
    /// Stdout only.
    #[default]
    Stdout,
    /// Stdout plus a daily-rolling file history under the given directory.
    ///
    /// Rolling by day bounds any single file without losing history on
    /// restart; a crash-looping replica would otherwise truncate away the
    /// evidence of its own crashes.
    WithFileHistory(PathBuf),
}

/// Flushes buffered file output when dropped.
///
/// Hold this for the process lifetime; stdout-only sinks carry no buffer
/// and the guard is inert.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// The sink the worker runs with unless a deployment opts out: stdout for
/// the collector plus a file history under `logs/`.
pub fn default_sink() -> LogSink {
    LogSink::WithFileHistory(PathBuf::from("logs"))
}

/// Install the global subscriber for the selected sink.
///
/// # Errors
///
/// Fails if the history directory cannot be created or a subscriber is
/// already installed in this process.
pub fn init(sink: LogSink) -> Result<LogGuard, LogError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .with_target(true)
        .compact();

    match sink {
        LogSink::Stdout => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .try_init()
                .map_err(|_| LogError::AlreadyInitialized)?;

            Ok(LogGuard { _file_guard: None })
        }
        LogSink::WithFileHistory(dir) => {
            std::fs::create_dir_all(&dir).map_err(|source| LogError::CreateDir {
                dir: dir.clone(),
                source,
            })?;

            let appender = tracing_appender::rolling::daily(&dir, FILE_PREFIX);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .compact();

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init()
                .map_err(|_| LogError::AlreadyInitialized)?;

            Ok(LogGuard {
                _file_guard: Some(file_guard),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sink_keeps_file_history() {
        match default_sink() {
            LogSink::WithFileHistory(dir) => assert_eq!(dir, PathBuf::from("logs")),
            LogSink::Stdout => panic!("default sink should keep a file history"),
        }
    }

    #[test]
    fn test_create_dir_error_names_the_directory() {
        let error = LogError::CreateDir {
            dir: PathBuf::from("/proc/nope"),
            source: io::Error::other("read-only"),
        };
        let message = error.to_string();
        assert!(message.contains("/proc/nope"));
        assert!(message.contains("read-only"));
    }

    // The global subscriber can only be installed once per process, so a
    // single test exercises init end to end: success, directory creation,
    // and the already-initialized rejection.
    #[test]
    fn test_init_installs_once_and_creates_history_dir() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("history");
        assert!(!history.exists());

        let _guard = init(LogSink::WithFileHistory(history.clone()))
            .expect("first init in this process");
        assert!(history.exists(), "history directory is created");

        let second = init(LogSink::Stdout);
        assert!(matches!(second, Err(LogError::AlreadyInitialized)));
    }

    #[test]
    fn test_unwritable_history_dir_fails_before_install() {
        // A path under an existing file cannot be created as a directory.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let result = init(LogSink::WithFileHistory(blocker.join("logs")));
        assert!(matches!(result, Err(LogError::CreateDir { .. })));
    }
}
