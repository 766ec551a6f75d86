//! Progress tracking and run control.
//!
//! `BackupProgress` is owned by the worker executing a run and handed to the
//! `ProgressCallback` by reference after every file, so readers always see a
//! consistent snapshot without locking.
//!
//! `RunControl` carries the cross-thread signals (cancel, pause, resume). They
//! are only observed at per-file checkpoints, never in the middle of a file.

use crate::model::{now_local, SkippedFile};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Counters and derived metrics for one backup run.
#[derive(Debug, Clone, Default)]
pub struct BackupProgress {
    /// Files that passed the filter during sizing
    pub total_files: u64,
    pub processed_files: u64,
    /// Bytes of the files counted in `total_files`
    pub total_size: u64,
    pub processed_size: u64,

    pub current_file: Option<PathBuf>,
    pub current_file_size: u64,
    pub current_file_processed: u64,

    /// Human-readable per-file errors
    pub errors: Vec<String>,
    pub skipped_files: Vec<SkippedFile>,

    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,

    /// Cancel signal as seen at the last checkpoint
    pub is_cancelled: bool,
    /// Pause signal as seen at the last checkpoint
    pub is_paused: bool,

    started: Option<Instant>,
    elapsed_at_finish: Option<Duration>,
}

impl BackupProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.started_at = Some(now_local());
    }

    pub fn finish(&mut self) {
        self.elapsed_at_finish = Some(self.elapsed());
        self.finished_at = Some(now_local());
        self.current_file = None;
    }

    /// Wall time since `start`; frozen once the run has finished.
    pub fn elapsed(&self) -> Duration {
        if let Some(elapsed) = self.elapsed_at_finish {
            return elapsed;
        }
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Percentage of files processed, 0 when nothing was counted.
    pub fn percent_complete(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        self.processed_files as f64 / self.total_files as f64 * 100.0
    }

    /// Average throughput over the whole run in MB/s.
    pub fn throughput_mbps(&self) -> f64 {
        if self.started.is_none() {
            return 0.0;
        }
        self.throughput_over(self.elapsed())
    }

    /// Estimated seconds left at the current average throughput.
    pub fn eta_seconds(&self) -> u64 {
        if self.started.is_none() {
            return 0;
        }
        self.eta_over(self.elapsed())
    }

    fn throughput_over(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.processed_size as f64 / BYTES_PER_MB / secs
    }

    fn eta_over(&self, elapsed: Duration) -> u64 {
        let speed = self.throughput_over(elapsed);
        if speed == 0.0 {
            return 0;
        }
        let remaining_mb = self.total_size.saturating_sub(self.processed_size) as f64 / BYTES_PER_MB;
        (remaining_mb / speed) as u64
    }

    pub(crate) fn begin_file(&mut self, path: &Path, size: u64) {
        self.current_file = Some(path.to_path_buf());
        self.current_file_size = size;
        self.current_file_processed = 0;
    }

    pub(crate) fn complete_file(&mut self, bytes: u64) {
        self.current_file_processed = bytes;
        self.processed_files += 1;
        self.processed_size += bytes;
    }

    pub(crate) fn record_error(&mut self, message: String) {
        self.errors.push(message);
    }

    pub(crate) fn record_skip(&mut self, path: &Path, reason: impl Into<String>) {
        self.skipped_files.push(SkippedFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        });
    }
}

/// Receives a progress snapshot after each file of a run.
///
/// Called synchronously on the backup worker thread; implementations that
/// drive a UI should forward the data to their own thread.
pub trait ProgressCallback: Send {
    fn on_progress(&self, progress: &BackupProgress);
}

impl<F> ProgressCallback for F
where
    F: Fn(&BackupProgress) + Send,
{
    fn on_progress(&self, progress: &BackupProgress) {
        self(progress)
    }
}

/// Cancel and pause signals shared between a run and its controllers.
#[derive(Debug)]
pub struct RunControl {
    cancelled: AtomicBool,
    paused: Mutex<bool>,
    changed: Condvar,
    poll: Duration,
}

impl RunControl {
    /// `poll` bounds how long a paused worker sleeps between flag checks.
    pub fn new(poll: Duration) -> Self {
        RunControl {
            cancelled: AtomicBool::new(false),
            paused: Mutex::new(false),
            changed: Condvar::new(),
            poll,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        self.changed.notify_all();
    }

    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear both signals before a new run.
    pub(crate) fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Block while paused. Returns true if the run was cancelled.
    pub fn wait_while_paused(&self) -> bool {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        while *paused && !self.is_cancelled() {
            paused = self
                .changed
                .wait_timeout(paused, self.poll)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        self.is_cancelled()
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
