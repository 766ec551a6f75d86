//! Core data model for backup jobs and runs.
//!
//! This module defines the durable and persisted structures:
//! - BackupJob: a saved job definition (the job store's wire format)
//! - FilterSet, Schedule: the parts of a job that shape a run and its timing
//! - JobPatch: explicit patch applied by job-editing collaborators
//! - BackupRunMetadata: the record written next to every finished artifact
//!
//! Field names are part of the JSON contract with the job-authoring UI, so
//! they are kept in snake_case exactly as stored on disk.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Current local wall-clock time, the clock every timestamp in a job uses.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// A saved backup job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJob {
    /// Unique identifier, never changes after creation
    pub job_id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Files and directories to back up, in the order they are walked
    #[serde(default)]
    pub source_paths: Vec<PathBuf>,

    /// Root under which the job folder is created
    #[serde(default)]
    pub destination_path: PathBuf,

    #[serde(default)]
    pub backup_type: BackupMode,

    /// Disabled jobs are never scheduled (run_now still works)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Schedule,

    #[serde(default)]
    pub filters: FilterSet,

    /// Zip archive when true, mirrored directory tree when false
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Reserved; has no effect on a run
    #[serde(default)]
    pub encryption: bool,

    #[serde(default = "now_local")]
    pub created_at: NaiveDateTime,

    #[serde(default = "now_local")]
    pub modified_at: NaiveDateTime,

    #[serde(default)]
    pub last_run: Option<NaiveDateTime>,

    /// Next trigger time as computed by the scheduler
    #[serde(default)]
    pub next_run: Option<NaiveDateTime>,

    #[serde(default)]
    pub status: JobStatus,
}

fn default_true() -> bool {
    true
}

impl BackupJob {
    /// Create a new job with a fresh id, a manual schedule and no filters.
    pub fn new(
        name: impl Into<String>,
        source_paths: Vec<PathBuf>,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        let now = now_local();
        BackupJob {
            job_id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            source_paths,
            destination_path: destination_path.into(),
            backup_type: BackupMode::Full,
            enabled: true,
            schedule: Schedule::Manual,
            filters: FilterSet::default(),
            compression: true,
            encryption: false,
            created_at: now,
            modified_at: now,
            last_run: None,
            next_run: None,
            status: JobStatus::Scheduled,
        }
    }

    /// A job needs at least one source path before it can run.
    pub fn is_runnable(&self) -> bool {
        !self.source_paths.is_empty()
    }

    /// Apply a configuration patch. Status is never touched here.
    pub fn apply_patch(&mut self, patch: JobPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(source_paths) = patch.source_paths {
            self.source_paths = source_paths;
        }
        if let Some(destination_path) = patch.destination_path {
            self.destination_path = destination_path;
        }
        if let Some(backup_type) = patch.backup_type {
            self.backup_type = backup_type;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(schedule) = patch.schedule {
            self.schedule = schedule;
        }
        if let Some(filters) = patch.filters {
            self.filters = filters;
        }
        if let Some(compression) = patch.compression {
            self.compression = compression;
        }
        if let Some(encryption) = patch.encryption {
            self.encryption = encryption;
        }
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = now_local();
    }
}

/// Configuration changes a job editor may make.
///
/// Every `None` field leaves the job's current value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub source_paths: Option<Vec<PathBuf>>,
    pub destination_path: Option<PathBuf>,
    pub backup_type: Option<BackupMode>,
    pub enabled: Option<bool>,
    pub schedule: Option<Schedule>,
    pub filters: Option<FilterSet>,
    pub compression: Option<bool>,
    pub encryption: Option<bool>,
}

impl JobPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn source_paths(mut self, source_paths: Vec<PathBuf>) -> Self {
        self.source_paths = Some(source_paths);
        self
    }

    pub fn destination_path(mut self, destination_path: impl Into<PathBuf>) -> Self {
        self.destination_path = Some(destination_path.into());
        self
    }

    pub fn backup_type(mut self, backup_type: BackupMode) -> Self {
        self.backup_type = Some(backup_type);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn filters(mut self, filters: FilterSet) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn compression(mut self, compression: bool) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn encryption(mut self, encryption: bool) -> Self {
        self.encryption = Some(encryption);
        self
    }
}

/// Inclusion rules applied to every candidate file.
///
/// Empty lists and zero bounds leave that rule unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSet {
    /// Only these extensions are kept (leading dot optional)
    pub include_extensions: Vec<String>,
    /// These extensions are dropped (leading dot optional)
    pub exclude_extensions: Vec<String>,
    pub min_size_mb: f64,
    pub max_size_mb: f64,
    /// Literal substrings of the path that exclude a file
    pub exclude_patterns: Vec<String>,
}

/// Backup mode requested by a job.
///
/// Only full backups have distinct semantics; the other modes run as full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    #[default]
    Full,
    Incremental,
    Differential,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Full => write!(f, "full"),
            BackupMode::Incremental => write!(f, "incremental"),
            BackupMode::Differential => write!(f, "differential"),
        }
    }
}

/// Status of a job as last set by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Scheduled,
    Running,
    Completed,
    Failed,
    Paused,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Scheduled => write!(f, "scheduled"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Paused => write!(f, "paused"),
        }
    }
}

/// When a job runs on its own.
///
/// Stored as `{"type": "daily", "time": "02:00"}` and friends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schedule {
    /// Only runs when triggered by hand
    #[default]
    Manual,
    Daily {
        #[serde(default = "default_time")]
        time: String,
    },
    Weekly {
        #[serde(default)]
        day: Weekday,
        #[serde(default = "default_time")]
        time: String,
    },
    /// Checked daily at `time`; runs only when the day of month matches
    Monthly {
        #[serde(default = "default_day_of_month")]
        day_of_month: u32,
        #[serde(default = "default_time")]
        time: String,
    },
    Interval {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        unit: IntervalUnit,
    },
}

fn default_time() -> String {
    "00:00".to_string()
}

fn default_day_of_month() -> u32 {
    1
}

fn default_interval() -> u32 {
    1
}

impl Schedule {
    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::Manual => "manual",
            Schedule::Daily { .. } => "daily",
            Schedule::Weekly { .. } => "weekly",
            Schedule::Monthly { .. } => "monthly",
            Schedule::Interval { .. } => "interval",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    #[default]
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    #[default]
    Hours,
    Days,
}

impl IntervalUnit {
    /// Length of `count` units.
    pub fn span(self, count: u32) -> chrono::Duration {
        let count = i64::from(count);
        match self {
            IntervalUnit::Minutes => chrono::Duration::minutes(count),
            IntervalUnit::Hours => chrono::Duration::hours(count),
            IntervalUnit::Days => chrono::Duration::days(count),
        }
    }
}

/// A file the run saw but deliberately did not back up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of one backup run, written as `backup_<timestamp>_metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRunMetadata {
    /// Run timestamp, `YYYYMMDD_HHMMSS`
    pub timestamp: String,
    pub backup_type: BackupMode,
    pub source_paths: Vec<PathBuf>,
    /// The archive file or mirror directory produced by the run
    pub destination: PathBuf,
    /// Files actually written (not the sizing estimate)
    pub total_files: u64,
    /// Bytes actually written (not the sizing estimate)
    pub total_size: u64,
    pub compression: bool,
    /// Hex SHA-256 of the artifact
    pub checksum: String,
    pub errors: Vec<String>,
    pub skipped_files: Vec<SkippedFile>,
    pub duration_seconds: f64,
    /// True when the run stopped early on a cancel signal
    #[serde(default)]
    pub cancelled: bool,
}
