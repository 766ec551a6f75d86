//! Error types for the backup engine.
//!
//! The primary error type is `EngineError`, which represents run-level errors
//! that abort a backup or a scheduler/store operation. File-level errors are
//! recorded in the run's `BackupProgress` error list, not as EngineError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a backup run or a job management operation.
///
/// A single unreadable file never produces one of these; it is recorded
/// against the run and processing continues.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request carried no source paths
    #[error("Backup has no source paths")]
    NoSources,

    /// Failed to create a directory in the destination layout
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to open or finalize the archive container
    #[error("Archive error at {}: {message}", path.display())]
    ArchiveFailed { path: PathBuf, message: String },

    /// Failed to read a file outside the per-file pipeline
    #[error("Failed to read file: {}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write a file outside the per-file pipeline
    #[error("Failed to write file: {}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to size the source trees before writing
    #[error("Failed to calculate backup size for {}", path.display())]
    SizingFailed { path: PathBuf, source: io::Error },

    /// Checksum of the finished artifact could not be computed
    #[error("Failed to compute checksum of {}", path.display())]
    ChecksumFailed { path: PathBuf, source: io::Error },

    /// Run metadata could not be serialized or written
    #[error("Failed to write run metadata to {}", path.display())]
    MetadataFailed { path: PathBuf, message: String },

    /// Job definitions could not be loaded or saved
    #[error("Job store error at {}: {message}", path.display())]
    StoreFailed { path: PathBuf, message: String },

    /// Engine configuration could not be loaded
    #[error("Configuration error at {}: {message}", path.display())]
    ConfigFailed { path: PathBuf, message: String },

    /// No job with this id exists in the store
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// A job with this id is already in the store
    #[error("Job already exists: {id}")]
    JobAlreadyExists { id: String },

    /// The job already has a run in flight
    #[error("Job is already running: {id}")]
    JobAlreadyRunning { id: String },

    /// A schedule descriptor cannot be turned into a trigger
    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    /// Catch-all for unexpected errors
    #[error("Engine error: {message}")]
    Unknown { message: String },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::DirectoryCreationFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::SizingFailed { source, .. }
            | Self::ChecksumFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Unknown {
            message: err.to_string(),
        }
    }
}
