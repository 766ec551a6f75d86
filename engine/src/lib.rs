//! # BackUP Engine - Backup and Scheduling Library
//!
//! A headless backup engine with a built-in job scheduler.
//! Designed as the foundation for multiple front ends (CLI, GUI, services).
//!
//! ## Overview
//!
//! The engine turns a saved job definition into a backup artifact: either one
//! deflate-compressed zip archive or a mirrored directory tree, plus a JSON
//! metadata record with a SHA-256 checksum. It features:
//! - Extension, size and pattern filters applied per file
//! - Per-file error isolation (one bad file never aborts a run)
//! - Progress reporting via callbacks (decoupled from UI technology)
//! - Cancel, pause and resume from any thread
//! - A JSON job store and a scheduler for daily, weekly, monthly and interval jobs
//!
//! ## Basic Usage
//!
//! ```no_run
//! use backup_engine::{BackupEngine, BackupProgress, BackupRequest, FilterSet};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = BackupRequest::new(vec![PathBuf::from("/home/me/docs")], "/mnt/backup")
//!     .with_filters(FilterSet {
//!         exclude_extensions: vec!["tmp".to_string()],
//!         ..FilterSet::default()
//!     });
//!
//! let engine = BackupEngine::new();
//! let report = |p: &BackupProgress| println!("{:.1}%", p.percent_complete());
//! let metadata = engine.perform_backup(&request, Some(&report))?;
//!
//! println!("{} files, checksum {}", metadata.total_files, metadata.checksum);
//! # Ok(())
//! # }
//! ```
//!
//! ## Scheduled Jobs
//!
//! ```no_run
//! use backup_engine::{logging, AppContext, BackupJob, EngineConfig, Schedule};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(Path::new("engine.json"))?;
//! logging::init(&config.log_level, config.log_dir.as_deref())?;
//! let context = AppContext::new(config)?;
//!
//! let mut job = BackupJob::new("Docs", vec![PathBuf::from("/home/me/docs")], "/mnt/backup");
//! job.schedule = Schedule::Daily { time: "02:00".to_string() };
//! let job = context.store.create(job)?;
//!
//! context.scheduler.start()?;
//! context.scheduler.run_now(&job.job_id)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (BackupJob, FilterSet, Schedule, run metadata)
//! - **error**: Error types and handling
//! - **filter**: Per-file inclusion rules
//! - **progress**: Progress tracking, callback trait and run control
//! - **fs_ops**: Low-level filesystem operations
//! - **sink**: Zip archive and mirrored tree writers
//! - **checksums**: Checksum computation for finished backups
//! - **engine**: Backup run orchestration
//! - **store**: JSON job persistence
//! - **trigger**: Schedule arithmetic
//! - **scheduler**: Polling scheduler and on-demand runs
//! - **config**, **logging**, **context**: Process setup

pub mod model;
pub mod error;
pub mod filter;
pub mod progress;
pub mod fs_ops;
pub mod sink;
pub mod checksums;
pub mod engine;
pub mod store;
pub mod trigger;
pub mod scheduler;
pub mod config;
pub mod logging;
pub mod context;

// Re-export main types and functions
pub use model::{
    BackupJob, JobPatch, FilterSet, BackupMode, JobStatus, Schedule, Weekday, IntervalUnit,
    SkippedFile, BackupRunMetadata,
};
pub use error::EngineError;
pub use filter::should_include;
pub use progress::{BackupProgress, ProgressCallback, RunControl};
pub use sink::{BackupSink, FileOutcome, ArchiveWriter, TreeMirror};
pub use checksums::{compute_backup_checksum, compute_file_checksum};
pub use engine::{BackupEngine, BackupRequest, RunState, calculate_backup_size};
pub use store::JobStore;
pub use trigger::Trigger;
pub use scheduler::{Scheduler, SchedulerHooks, SchedulerOptions};
pub use config::EngineConfig;
pub use context::AppContext;
