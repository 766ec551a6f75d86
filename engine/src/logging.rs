//! Logging configuration using tracing.
//!
//! Events go to stdout and, when a log directory is given, to a dated file
//! that rolls over daily (`backup.YYYY-MM-DD.log`).

use crate::error::EngineError;
use crate::fs_ops;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Daily files kept in the log directory before the oldest is removed.
const MAX_LOG_FILES: usize = 30;

type FileLayer<S> = fmt::Layer<S, DefaultFields, Format, RollingFileAppender>;

/// Initialize logging with the specified level.
///
/// `RUST_LOG` takes precedence over `level` when set. With `log_dir`, every
/// event is also appended to the current day's file in that directory.
///
/// # Errors
/// Returns EngineError if the log directory cannot be created or a global
/// subscriber is already installed
pub fn init(level: &str, log_dir: Option<&Path>) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file = log_dir.map(file_layer).transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file)
        .try_init()
        .map_err(|e| EngineError::Unknown {
            message: format!("Failed to initialize logging: {}", e),
        })
}

/// Plain-text fmt layer writing to a daily rolling file in `log_dir`.
fn file_layer<S>(log_dir: &Path) -> Result<FileLayer<S>, EngineError> {
    fs_ops::create_dir_all(log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("backup")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .map_err(|e| EngineError::Unknown {
            message: format!("Failed to open log file in {}: {}", log_dir.display(), e),
        })?;

    Ok(fmt::layer().with_writer(appender).with_ansi(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_second_init_is_an_error() {
        // The first call may lose to another test's subscriber; the second never wins
        let _ = init("debug", None);
        assert!(init("info", None).is_err());
    }

    #[test]
    fn test_file_layer_writes_dated_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let log_dir = temp_dir.path().join("data").join("logs");

        let subscriber = tracing_subscriber::registry()
            .with(file_layer(&log_dir).expect("Failed to build file layer"));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(job_id = "abc", "Backup job failed");
        });

        let files: Vec<_> = fs::read_dir(&log_dir)
            .expect("Log dir missing")
            .map(|entry| entry.expect("Bad dir entry").path())
            .collect();
        assert_eq!(files.len(), 1);

        let name = files[0]
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .expect("Log file has no name");
        assert!(name.starts_with("backup.") && name.ends_with(".log"), "{}", name);

        let contents = fs::read_to_string(&files[0]).expect("Failed to read log file");
        assert!(contents.contains("Backup job failed"));
        assert!(contents.contains("job_id=\"abc\""));
    }

    #[test]
    fn test_unusable_log_dir_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("logs");
        fs::write(&blocker, b"not a dir").expect("Failed to write blocker");

        let result = file_layer::<tracing_subscriber::Registry>(&blocker);
        assert!(result.is_err());
    }
}
