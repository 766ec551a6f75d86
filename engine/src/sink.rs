//! Backup sinks: where accepted files end up.
//!
//! A run writes through exactly one sink, picked by the job's compression
//! flag. `add` never fails the run; it reports a per-file `FileOutcome`.
//! Only opening and finishing a sink are run-level operations.

use crate::error::EngineError;
use crate::fs_ops;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CHUNK_SIZE: usize = 64 * 1024;

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// What happened to a single file handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Written in full
    Added { bytes: u64 },
    /// Deliberately not written
    Skipped { reason: String },
    /// Writing failed; the run continues with the next file
    Errored { reason: String },
}

/// Accepts files one at a time and records them durably.
pub trait BackupSink {
    /// Store `source` under `relative` (relative to the sink's root).
    fn add(&mut self, source: &Path, relative: &Path) -> FileOutcome;

    /// Flush everything and return the artifact path.
    fn finish(self: Box<Self>) -> Result<PathBuf, EngineError>;

    /// Path of the artifact being produced.
    fn artifact(&self) -> &Path;
}

/// Writes every file into one deflate-compressed zip archive.
pub struct ArchiveWriter {
    path: PathBuf,
    zip: ZipWriter<File>,
    options: FileOptions,
}

impl ArchiveWriter {
    /// Create (or truncate) the archive at `path`.
    pub fn create(path: &Path) -> Result<Self, EngineError> {
        let file = File::create(path).map_err(|e| EngineError::ArchiveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(ArchiveWriter {
            path: path.to_path_buf(),
            zip: ZipWriter::new(file),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        })
    }

    /// Copy `reader` into a new entry named `name`.
    fn write_entry(&mut self, name: &str, size: u64, mut reader: impl Read) -> Result<u64, EntryError> {
        let options = self.options.large_file(size >= ZIP64_THRESHOLD);
        self.zip
            .start_file(name, options)
            .map_err(|e| EntryError::NotStarted(e.into()))?;
        io::copy(&mut reader, &mut self.zip).map_err(EntryError::Partial)
    }
}

/// Why an entry could not be written in full.
#[derive(Debug)]
enum EntryError {
    /// Nothing was added to the archive
    NotStarted(io::Error),
    /// The entry was started and is shorter than its source. zip offers no
    /// way to drop a started entry, so it stays in the archive.
    Partial(io::Error),
}

/// Open `source` for archiving, rejecting anything that is not a regular file.
fn open_regular(source: &Path) -> io::Result<(File, u64)> {
    let file = File::open(source)?;
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    Ok((file, metadata.len()))
}

impl BackupSink for ArchiveWriter {
    fn add(&mut self, source: &Path, relative: &Path) -> FileOutcome {
        let name = fs_ops::entry_name(relative);
        if name.is_empty() {
            return FileOutcome::Skipped {
                reason: "no archive entry name".to_string(),
            };
        }

        // Open first so a vanished or unreadable file never leaves an entry
        let (file, size) = match open_regular(source) {
            Ok(opened) => opened,
            Err(e) => {
                return FileOutcome::Errored {
                    reason: format!("Error adding {}: {}", source.display(), e),
                }
            }
        };

        match self.write_entry(&name, size, BufReader::with_capacity(CHUNK_SIZE, file)) {
            Ok(bytes) => FileOutcome::Added { bytes },
            Err(EntryError::NotStarted(e)) => FileOutcome::Errored {
                reason: format!("Error adding {}: {}", source.display(), e),
            },
            Err(EntryError::Partial(e)) => FileOutcome::Errored {
                reason: format!(
                    "Error adding {}: {} (partial entry {} left in archive)",
                    source.display(),
                    e,
                    name
                ),
            },
        }
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf, EngineError> {
        let mut file = self.zip.finish().map_err(|e| EngineError::ArchiveFailed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        file.flush().map_err(|e| EngineError::ArchiveFailed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        Ok(self.path)
    }

    fn artifact(&self) -> &Path {
        &self.path
    }
}

/// Copies every file into a plain directory tree.
pub struct TreeMirror {
    root: PathBuf,
}

impl TreeMirror {
    /// Create the mirror root directory.
    pub fn create(root: &Path) -> Result<Self, EngineError> {
        fs_ops::create_dir_all(root)?;
        Ok(TreeMirror {
            root: root.to_path_buf(),
        })
    }
}

impl BackupSink for TreeMirror {
    fn add(&mut self, source: &Path, relative: &Path) -> FileOutcome {
        let destination = self.root.join(relative);
        match fs_ops::copy_file_with_metadata(source, &destination) {
            Ok(bytes) => FileOutcome::Added { bytes },
            Err(e) => {
                let cause = match &e {
                    EngineError::ReadError { source, .. }
                    | EngineError::WriteError { source, .. }
                    | EngineError::DirectoryCreationFailed { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                FileOutcome::Errored {
                    reason: format!("Error copying {}: {}", source.display(), cause),
                }
            }
        }
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, EngineError> {
        Ok(self.root)
    }

    fn artifact(&self) -> &Path {
        &self.root
    }
}
