//! Engine configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! no file at all) is valid.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the daily log files; null disables file logging
    #[serde(default = "default_log_dir")]
    pub log_dir: Option<PathBuf>,

    /// Where the job store lives
    #[serde(default = "default_jobs_file")]
    pub jobs_file: PathBuf,

    /// How often the scheduler checks for due jobs
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How long `stop` waits for the scheduler thread
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Wake-up granularity of a paused run
    #[serde(default = "default_pause_poll_millis")]
    pub pause_poll_millis: u64,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("data").join("logs"))
}

fn default_jobs_file() -> PathBuf {
    PathBuf::from("data").join("jobs.json")
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_stop_timeout_secs() -> u64 {
    5
}

fn default_pause_poll_millis() -> u64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            jobs_file: default_jobs_file(),
            poll_interval_secs: default_poll_interval_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            pause_poll_millis: default_pause_poll_millis(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, falling back to defaults if the
    /// file does not exist.
    ///
    /// # Errors
    /// Returns EngineError if the file exists but cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(EngineError::ConfigFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| EngineError::ConfigFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_millis.max(1))
    }
}
