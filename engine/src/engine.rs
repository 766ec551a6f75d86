//! Backup run orchestration.
//!
//! `BackupEngine::perform_backup` drives a single run through its states:
//!
//! ```text
//! Idle -> Sizing -> Writing -> Finalizing -> Completed | Cancelled
//!            \          \           \
//!             +----------+-----------+-> Failed
//! ```
//!
//! Sizing walks every source once to count what passes the filter. Writing
//! walks again and streams each accepted file into the sink chosen by the
//! compression flag. Finalizing closes the sink, hashes the artifact and
//! writes the run metadata next to it.
//!
//! Per-file problems are recorded in the run's progress and never abort it.
//! Only sizing, directory creation, sink open/finish, checksum and metadata
//! failures are returned as `EngineError`.

use crate::checksums::compute_backup_checksum;
use crate::error::EngineError;
use crate::filter::should_include;
use crate::fs_ops::{self, WalkEntry};
use crate::model::{BackupJob, BackupMode, BackupRunMetadata, FilterSet};
use crate::progress::{BackupProgress, ProgressCallback, RunControl};
use crate::sink::{ArchiveWriter, BackupSink, FileOutcome, TreeMirror};
use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything a single run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRequest {
    pub source_paths: Vec<PathBuf>,
    /// Root under which the job folder is created
    pub destination: PathBuf,
    pub mode: BackupMode,
    pub filters: FilterSet,
    pub compression: bool,
    /// Names the job folder; falls back to the first source's name
    pub job_name: Option<String>,
}

impl BackupRequest {
    /// A full, compressed, unfiltered backup of `source_paths`.
    pub fn new(source_paths: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        BackupRequest {
            source_paths,
            destination: destination.into(),
            mode: BackupMode::Full,
            filters: FilterSet::default(),
            compression: true,
            job_name: None,
        }
    }

    /// Build the request for one run of a saved job.
    pub fn from_job(job: &BackupJob) -> Self {
        BackupRequest {
            source_paths: job.source_paths.clone(),
            destination: job.destination_path.clone(),
            mode: job.backup_type,
            filters: job.filters.clone(),
            compression: job.compression,
            job_name: Some(job.name.clone()).filter(|n| !n.trim().is_empty()),
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_mode(mut self, mode: BackupMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Sizing,
    Writing,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

/// Executes backup runs. One engine runs one backup at a time; its control
/// methods may be called from any thread while `perform_backup` is running.
/// A signal sent while no run is active is picked up by the next run.
#[derive(Debug)]
pub struct BackupEngine {
    control: RunControl,
    state: Mutex<RunState>,
}

/// Paths produced by one run.
struct BackupLayout {
    job_folder: PathBuf,
    artifact: PathBuf,
    metadata: PathBuf,
}

impl BackupLayout {
    fn new(request: &BackupRequest, timestamp: &str) -> Self {
        let folder = request
            .job_name
            .as_deref()
            .map(fs_ops::sanitize_folder_name)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                request
                    .source_paths
                    .first()
                    .map(|source| fs_ops::source_folder_name(source))
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| "backup".to_string());

        let job_folder = request.destination.join(folder);
        let artifact = if request.compression {
            job_folder.join(format!("backup_{}.zip", timestamp))
        } else {
            job_folder.join(format!("backup_{}", timestamp))
        };
        let metadata = job_folder.join(format!("backup_{}_metadata.json", timestamp));

        BackupLayout {
            job_folder,
            artifact,
            metadata,
        }
    }
}

impl BackupEngine {
    pub fn new() -> Self {
        Self::with_pause_poll(Duration::from_millis(100))
    }

    /// Engine whose paused worker re-checks its signals every `poll`.
    pub fn with_pause_poll(poll: Duration) -> Self {
        BackupEngine {
            control: RunControl::new(poll),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the current run at the next file boundary. Written data is kept.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Hold the current run at the next file boundary.
    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run one backup and return its metadata.
    ///
    /// `progress_callback` is invoked on this thread after every file.
    ///
    /// # Errors
    /// Returns EngineError only for run-level failures. Per-file failures end
    /// up in the metadata's `errors` list.
    pub fn perform_backup(
        &self,
        request: &BackupRequest,
        progress_callback: Option<&dyn ProgressCallback>,
    ) -> Result<BackupRunMetadata, EngineError> {
        let result = self.run(request, progress_callback);
        // Signals belong to one run
        self.control.reset();

        match result {
            Ok(metadata) => {
                let state = if metadata.cancelled {
                    RunState::Cancelled
                } else {
                    RunState::Completed
                };
                self.set_state(state);
                info!(
                    destination = %metadata.destination.display(),
                    files = metadata.total_files,
                    bytes = metadata.total_size,
                    errors = metadata.errors.len(),
                    cancelled = metadata.cancelled,
                    "Backup finished"
                );
                Ok(metadata)
            }
            Err(e) => {
                self.set_state(RunState::Failed);
                error!(error = %e, "Backup failed");
                Err(e)
            }
        }
    }

    fn run(
        &self,
        request: &BackupRequest,
        progress_callback: Option<&dyn ProgressCallback>,
    ) -> Result<BackupRunMetadata, EngineError> {
        if request.source_paths.is_empty() {
            return Err(EngineError::NoSources);
        }

        let mut progress = BackupProgress::new();
        progress.start();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let layout = BackupLayout::new(request, &timestamp);

        info!(
            sources = request.source_paths.len(),
            destination = %layout.artifact.display(),
            mode = %request.mode,
            compression = request.compression,
            "Starting backup"
        );

        self.set_state(RunState::Sizing);
        let (total_size, total_files) =
            calculate_backup_size(&request.source_paths, &request.filters)?;
        progress.total_size = total_size;
        progress.total_files = total_files;
        debug!(total_files, total_size, "Sizing complete");

        self.set_state(RunState::Writing);
        fs_ops::create_dir_all(&layout.job_folder)?;
        let mut sink: Box<dyn BackupSink> = if request.compression {
            Box::new(ArchiveWriter::create(&layout.artifact)?)
        } else {
            Box::new(TreeMirror::create(&layout.artifact)?)
        };

        let cancelled = self.write_sources(request, sink.as_mut(), &mut progress, progress_callback);
        if cancelled {
            warn!(
                processed = progress.processed_files,
                total = progress.total_files,
                "Backup cancelled; keeping partial output"
            );
        }

        self.set_state(RunState::Finalizing);
        let artifact = sink.finish()?;
        progress.finish();
        let duration_seconds = progress.elapsed().as_secs_f64();
        let checksum = compute_backup_checksum(&artifact)?;

        let metadata = BackupRunMetadata {
            timestamp,
            backup_type: request.mode,
            source_paths: request.source_paths.clone(),
            destination: artifact,
            total_files: progress.processed_files,
            total_size: progress.processed_size,
            compression: request.compression,
            checksum,
            errors: progress.errors,
            skipped_files: progress.skipped_files,
            duration_seconds,
            cancelled,
        };
        write_metadata(&layout.metadata, &metadata)?;

        Ok(metadata)
    }

    /// Stream every source through the filter into `sink`.
    /// Returns true if the run was cancelled.
    fn write_sources(
        &self,
        request: &BackupRequest,
        sink: &mut dyn BackupSink,
        progress: &mut BackupProgress,
        progress_callback: Option<&dyn ProgressCallback>,
    ) -> bool {
        let artifact = sink.artifact().to_path_buf();

        for source in &request.source_paths {
            if fs::symlink_metadata(source).is_err() {
                warn!(source = %source.display(), "Source not found");
                progress.record_error(format!("Source not found: {}", source.display()));
                continue;
            }

            // Archive entries are relative to the source directory itself (or
            // a lone file's parent); mirrored copies keep the directory name.
            let (base, mirror_prefix) = if source.is_dir() {
                let name = source.file_name().map(PathBuf::from).unwrap_or_default();
                (source.clone(), name)
            } else {
                let parent = source.parent().map(Path::to_path_buf).unwrap_or_default();
                (parent, PathBuf::new())
            };

            for entry in fs_ops::walk_source(source) {
                if self.checkpoint(progress) {
                    return true;
                }

                match entry {
                    WalkEntry::File(path) => {
                        if !should_include(&path, &request.filters) {
                            continue;
                        }
                        if path.starts_with(&artifact) {
                            progress.record_skip(&path, "inside the backup being written");
                            notify(progress_callback, progress);
                            continue;
                        }

                        let relative = match path.strip_prefix(&base) {
                            Ok(relative) => relative.to_path_buf(),
                            Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
                        };
                        let relative = if request.compression {
                            relative
                        } else {
                            mirror_prefix.join(relative)
                        };

                        backup_file(sink, &path, &relative, progress);
                        notify(progress_callback, progress);
                    }
                    WalkEntry::Special(path) => {
                        if should_include(&path, &request.filters) {
                            progress.record_skip(&path, "not a regular file");
                            notify(progress_callback, progress);
                        }
                    }
                    WalkEntry::Unreadable { path, error } => {
                        let shown = path
                            .as_deref()
                            .unwrap_or(source.as_path())
                            .display()
                            .to_string();
                        warn!(path = %shown, error = %error, "Cannot read entry");
                        progress.record_error(format!("Error reading {}: {}", shown, error));
                    }
                }
            }
        }

        false
    }

    /// Per-file checkpoint: honour cancel, block while paused.
    fn checkpoint(&self, progress: &mut BackupProgress) -> bool {
        if self.control.is_cancelled() {
            progress.is_cancelled = true;
            return true;
        }
        if self.control.is_paused() {
            progress.is_paused = true;
            debug!("Backup paused");
            let cancelled = self.control.wait_while_paused();
            progress.is_paused = false;
            if cancelled {
                progress.is_cancelled = true;
                return true;
            }
            debug!("Backup resumed");
        }
        false
    }
}

impl Default for BackupEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn backup_file(sink: &mut dyn BackupSink, path: &Path, relative: &Path, progress: &mut BackupProgress) {
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    progress.begin_file(path, size);

    match sink.add(path, relative) {
        FileOutcome::Added { bytes } => progress.complete_file(bytes),
        FileOutcome::Skipped { reason } => progress.record_skip(path, reason),
        FileOutcome::Errored { reason } => {
            warn!(path = %path.display(), reason = %reason, "File failed");
            progress.record_error(reason);
        }
    }
}

fn notify(progress_callback: Option<&dyn ProgressCallback>, progress: &BackupProgress) {
    if let Some(callback) = progress_callback {
        callback.on_progress(progress);
    }
}

/// Count the bytes and files of `sources` that pass `filters`.
///
/// Sources that do not exist are skipped; unreadable entries inside a tree
/// are ignored.
///
/// # Errors
/// Returns EngineError if a source exists but cannot be inspected.
pub fn calculate_backup_size(
    sources: &[PathBuf],
    filters: &FilterSet,
) -> Result<(u64, u64), EngineError> {
    let mut total_size = 0u64;
    let mut total_files = 0u64;

    for source in sources {
        match fs::symlink_metadata(source) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(EngineError::SizingFailed {
                    path: source.clone(),
                    source: e,
                })
            }
        }

        for entry in fs_ops::walk_source(source) {
            if let WalkEntry::File(path) = entry {
                if !should_include(&path, filters) {
                    continue;
                }
                if let Ok(metadata) = fs::metadata(&path) {
                    total_size += metadata.len();
                    total_files += 1;
                }
            }
        }
    }

    Ok((total_size, total_files))
}

fn write_metadata(path: &Path, metadata: &BackupRunMetadata) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(metadata).map_err(|e| EngineError::MetadataFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, json).map_err(|e| EngineError::MetadataFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::Arc;
    use std::thread;

    fn make_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (name, contents) in files {
            let path = root.join(name);
            fs::create_dir_all(path.parent().expect("File has no parent"))
                .expect("Failed to create dirs");
            fs::write(&path, contents).expect("Failed to write file");
        }
    }

    fn read_metadata(metadata: &BackupRunMetadata) -> BackupRunMetadata {
        let folder = metadata.destination.parent().expect("Artifact has no parent");
        let path = folder.join(format!("backup_{}_metadata.json", metadata.timestamp));
        let text = fs::read_to_string(path).expect("Failed to read metadata file");
        serde_json::from_str(&text).expect("Failed to parse metadata file")
    }

    #[test]
    fn test_single_file_compressed_backup() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("notes.txt");
        fs::write(&src, b"0123456789").expect("Failed to write source");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&dst).expect("Failed to create dst dir");

        let engine = BackupEngine::new();
        let metadata = engine
            .perform_backup(&BackupRequest::new(vec![src.clone()], &dst), None)
            .expect("Backup failed");

        assert_eq!(engine.state(), RunState::Completed);
        assert_eq!(metadata.total_files, 1);
        assert_eq!(metadata.total_size, 10);
        assert!(metadata.errors.is_empty());
        assert!(!metadata.cancelled);

        let expected_archive = dst
            .join("notes")
            .join(format!("backup_{}.zip", metadata.timestamp));
        assert_eq!(metadata.destination, expected_archive);

        let mut archive = zip::ZipArchive::new(File::open(&expected_archive).expect("Failed to open"))
            .expect("Failed to read archive");
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.by_index(0).expect("Missing entry").name(), "notes.txt");

        let checksum = compute_backup_checksum(&expected_archive).expect("Checksum failed");
        assert_eq!(metadata.checksum, checksum);

        assert_eq!(read_metadata(&metadata), metadata);
    }

    #[test]
    fn test_filters_apply_to_sizing_and_writing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("logs_and_text");
        make_tree(&src, &[("a.txt", b"aaa"), ("b.log", b"bbbb")]);
        let filters = FilterSet {
            exclude_extensions: vec!["log".to_string()],
            ..FilterSet::default()
        };

        let (size, files) =
            calculate_backup_size(&[src.clone()], &filters).expect("Sizing failed");
        assert_eq!((size, files), (3, 1));

        let engine = BackupEngine::new();
        let request = BackupRequest::new(vec![src], temp_dir.path().join("dst")).with_filters(filters);
        let metadata = engine.perform_backup(&request, None).expect("Backup failed");
        assert_eq!(metadata.total_files, 1);

        let archive = zip::ZipArchive::new(File::open(&metadata.destination).expect("Failed to open"))
            .expect("Failed to read archive");
        let names: Vec<_> = archive.file_names().collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[test]
    fn test_uncompressed_backup_mirrors_tree() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("project");
        make_tree(&src, &[("readme.md", b"hello"), ("src/main.rs", b"fn main() {}")]);
        let single = temp_dir.path().join("todo.txt");
        fs::write(&single, b"milk").expect("Failed to write file");
        let dst = temp_dir.path().join("dst");

        let engine = BackupEngine::new();
        let request = BackupRequest::new(vec![src, single], &dst)
            .with_compression(false)
            .with_job_name("Work Stuff!");
        let metadata = engine.perform_backup(&request, None).expect("Backup failed");

        let mirror = dst
            .join("Work_Stuff_")
            .join(format!("backup_{}", metadata.timestamp));
        assert_eq!(metadata.destination, mirror);
        assert_eq!(metadata.total_files, 3);
        assert_eq!(
            fs::read_to_string(mirror.join("project").join("src").join("main.rs"))
                .expect("Missing mirrored file"),
            "fn main() {}"
        );
        assert_eq!(
            fs::read_to_string(mirror.join("todo.txt")).expect("Missing mirrored file"),
            "milk"
        );
        assert_eq!(
            metadata.checksum,
            compute_backup_checksum(&mirror).expect("Checksum failed")
        );
        assert_eq!(read_metadata(&metadata).total_files, 3);
    }

    #[test]
    fn test_unchanged_sources_give_same_checksum() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("data");
        make_tree(&src, &[("one.txt", b"1"), ("nested/two.txt", b"22")]);
        let request = BackupRequest::new(vec![src], temp_dir.path().join("dst")).with_compression(false);

        let engine = BackupEngine::new();
        let first = engine.perform_backup(&request, None).expect("First backup failed");
        let second = engine.perform_backup(&request, None).expect("Second backup failed");

        assert_eq!(first.checksum, second.checksum);
    }

    #[test]
    fn test_missing_source_is_recorded_not_fatal() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let present = temp_dir.path().join("present.txt");
        fs::write(&present, b"here").expect("Failed to write file");
        let missing = temp_dir.path().join("missing");

        let engine = BackupEngine::new();
        let request = BackupRequest::new(vec![missing.clone(), present], temp_dir.path().join("dst"));
        let metadata = engine.perform_backup(&request, None).expect("Backup failed");

        assert_eq!(metadata.total_files, 1);
        assert_eq!(
            metadata.errors,
            vec![format!("Source not found: {}", missing.display())]
        );
        // Folder falls back to the first source's name even though it is missing
        assert!(metadata.destination.starts_with(temp_dir.path().join("dst").join("missing")));
    }

    #[test]
    fn test_no_sources_fails_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let engine = BackupEngine::new();

        let result = engine.perform_backup(&BackupRequest::new(Vec::new(), temp_dir.path()), None);

        assert!(matches!(result, Err(EngineError::NoSources)));
        assert_eq!(engine.state(), RunState::Failed);
    }

    #[test]
    fn test_unusable_destination_fails_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("a.txt");
        fs::write(&src, b"a").expect("Failed to write file");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"not a dir").expect("Failed to write file");

        let engine = BackupEngine::new();
        let result = engine.perform_backup(&BackupRequest::new(vec![src], &blocker), None);

        assert!(matches!(result, Err(EngineError::DirectoryCreationFailed { .. })));
        assert_eq!(engine.state(), RunState::Failed);
    }

    #[test]
    fn test_callback_sees_every_file_and_reaches_100_percent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        make_tree(&src, &[("1.txt", b"1"), ("2.txt", b"22"), ("3.txt", b"333")]);

        let seen = std::sync::Mutex::new(Vec::new());
        let callback = |p: &BackupProgress| {
            seen.lock().unwrap().push((p.processed_files, p.percent_complete()));
        };

        let engine = BackupEngine::new();
        engine
            .perform_backup(&BackupRequest::new(vec![src], temp_dir.path().join("dst")), Some(&callback))
            .expect("Backup failed");

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(seen.last().map(|s| s.0), Some(3));
        assert_eq!(seen.last().map(|s| s.1), Some(100.0));
    }

    #[test]
    fn test_cancel_keeps_partial_backup() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        make_tree(&src, &[("1.txt", b"1"), ("2.txt", b"22"), ("3.txt", b"333")]);

        let engine = BackupEngine::new();
        let callback = |_: &BackupProgress| engine.cancel();
        let request = BackupRequest::new(vec![src], temp_dir.path().join("dst")).with_compression(false);
        let metadata = engine.perform_backup(&request, Some(&callback)).expect("Backup failed");

        assert!(metadata.cancelled);
        assert_eq!(engine.state(), RunState::Cancelled);
        assert_eq!(metadata.total_files, 1);
        assert!(metadata.total_size <= 3);

        let persisted = read_metadata(&metadata);
        assert_eq!(persisted.total_files, 1);
        assert!(persisted.cancelled);
    }

    #[test]
    fn test_pause_blocks_until_resume() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        make_tree(&src, &[("1.txt", b"1"), ("2.txt", b"22"), ("3.txt", b"333")]);

        let engine = Arc::new(BackupEngine::with_pause_poll(Duration::from_millis(10)));
        let paused_once = std::sync::atomic::AtomicBool::new(false);
        let callback = |_: &BackupProgress| {
            if !paused_once.swap(true, std::sync::atomic::Ordering::SeqCst) {
                engine.pause();
            }
        };

        let resumer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                while !engine.is_paused() {
                    thread::sleep(Duration::from_millis(5));
                }
                thread::sleep(Duration::from_millis(50));
                engine.resume();
            })
        };

        let request = BackupRequest::new(vec![src], temp_dir.path().join("dst"));
        let metadata = engine.perform_backup(&request, Some(&callback)).expect("Backup failed");
        resumer.join().expect("Resumer panicked");

        assert_eq!(metadata.total_files, 3);
        assert!(!metadata.cancelled);
        assert!(metadata.duration_seconds >= 0.05);
    }

    #[test]
    fn test_destination_inside_source_skips_own_output() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("home");
        make_tree(&src, &[("a.txt", b"abc")]);

        let engine = BackupEngine::new();
        let request = BackupRequest::new(vec![src.clone()], src.join("backups")).with_compression(false);
        let metadata = engine.perform_backup(&request, None).expect("Backup failed");

        assert_eq!(metadata.total_files, 1);
        assert!(metadata.errors.is_empty());
        assert!(metadata
            .skipped_files
            .iter()
            .all(|s| s.path.starts_with(&metadata.destination)));
    }

    #[test]
    fn test_request_from_job() {
        let mut job = BackupJob::new("Nightly", vec![PathBuf::from("/data")], "/mnt/backup");
        job.compression = false;
        job.backup_type = BackupMode::Incremental;

        let request = BackupRequest::from_job(&job);
        assert_eq!(request.job_name.as_deref(), Some("Nightly"));
        assert_eq!(request.mode, BackupMode::Incremental);
        assert!(!request.compression);
        assert_eq!(request.destination, PathBuf::from("/mnt/backup"));

        job.name = "  ".to_string();
        assert_eq!(BackupRequest::from_job(&job).job_name, None);
    }

    #[test]
    fn test_file_failing_mid_walk_does_not_stop_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        make_tree(&src, &[("a.txt", b"a"), ("b.txt", b"bb"), ("c.txt", b"ccc")]);
        let swapped = src.join("b.txt");

        // Once a.txt is done, b.txt turns into a directory under the walker
        let callback = |p: &BackupProgress| {
            if p.processed_files == 1 && swapped.is_file() {
                fs::remove_file(&swapped).expect("Failed to remove file");
                fs::create_dir(&swapped).expect("Failed to create dir");
            }
        };

        let engine = BackupEngine::new();
        let request = BackupRequest::new(vec![src], temp_dir.path().join("dst"));
        let metadata = engine.perform_backup(&request, Some(&callback)).expect("Backup failed");

        assert_eq!(engine.state(), RunState::Completed);
        assert_eq!(metadata.errors.len(), 1);
        assert!(metadata.errors[0].contains("b.txt"));
        assert_eq!(metadata.total_files, 2);
        assert_eq!(metadata.total_size, 4);

        let archive = zip::ZipArchive::new(File::open(&metadata.destination).expect("Failed to open"))
            .expect("Failed to read archive");
        let names: Vec<_> = archive.file_names().collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
    }

    #[test]
    fn test_file_over_4_gib_is_archived() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        make_tree(&src, &[("a_small.txt", b"first"), ("z_small.txt", b"last")]);

        // Sparse, so the test costs compression time but not disk space
        let big_len = u64::from(u32::MAX) + 16;
        File::create(src.join("big.img"))
            .and_then(|file| file.set_len(big_len))
            .expect("Failed to create sparse file");

        let engine = BackupEngine::new();
        let request = BackupRequest::new(vec![src], temp_dir.path().join("dst"));
        let metadata = engine.perform_backup(&request, None).expect("Backup failed");

        assert!(metadata.errors.is_empty(), "errors: {:?}", metadata.errors);
        assert_eq!(metadata.total_files, 3);
        assert_eq!(metadata.total_size, big_len + 9);

        let mut archive = zip::ZipArchive::new(File::open(&metadata.destination).expect("Failed to open"))
            .expect("Failed to read archive");
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.by_name("big.img").expect("Missing entry").size(), big_len);
        assert_eq!(archive.by_name("z_small.txt").expect("Missing entry").size(), 4);
    }
}
