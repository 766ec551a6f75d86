//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Walking source trees in filesystem order
//! - Copying files with metadata preservation
//! - Creating directories recursively
//! - Naming job folders and archive entries

use crate::error::EngineError;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// One item produced while walking a source tree. Directories are not
/// reported; they only contribute their contents.
#[derive(Debug)]
pub enum WalkEntry {
    /// A regular file, or a symlink resolving to one
    File(PathBuf),
    /// Something that is neither a file nor a directory (fifo, socket,
    /// device, symlink to a directory)
    Special(PathBuf),
    /// An entry that could not be read
    Unreadable { path: Option<PathBuf>, error: String },
}

/// Walk `root` and yield every non-directory entry, sorted by file name
/// within each directory.
///
/// A `root` that is itself a file yields just that file. Symlinked
/// directories are not descended into.
pub fn walk_source(root: &Path) -> impl Iterator<Item = WalkEntry> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => classify(entry),
            Err(e) => {
                let path = e.path().map(Path::to_path_buf);
                Some(WalkEntry::Unreadable {
                    path,
                    error: e.to_string(),
                })
            }
        })
}

fn classify(entry: DirEntry) -> Option<WalkEntry> {
    let file_type = entry.file_type();
    if file_type.is_dir() {
        return None;
    }
    if file_type.is_file() {
        return Some(WalkEntry::File(entry.into_path()));
    }
    if file_type.is_symlink() {
        return match fs::metadata(entry.path()) {
            Ok(target) if target.is_file() => Some(WalkEntry::File(entry.into_path())),
            Ok(_) => Some(WalkEntry::Special(entry.into_path())),
            // Dangling link: let the filter's stat reject it like any vanished file
            Err(_) => Some(WalkEntry::File(entry.into_path())),
        };
    }
    Some(WalkEntry::Special(entry.into_path()))
}

/// Copy a file from source to destination with metadata preservation.
///
/// The modification time and permission bits of `src` are applied to `dst`.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns EngineError if the copy fails
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;
    drop(dst_file);

    fs::set_permissions(dst, src_metadata.permissions()).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    if let Ok(mtime) = src_metadata.modified() {
        filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)).map_err(|e| {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        })?;
    }

    Ok(bytes_copied)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if directory creation fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Create `path` and all missing ancestors.
///
/// # Errors
/// Returns EngineError if `path` exists but is not a directory, or creation fails
pub fn create_dir_all(path: &Path) -> Result<(), EngineError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Turn a job name into a folder name.
///
/// Anything other than alphanumerics, space, `-` and `_` becomes `_`; the
/// result is trimmed and spaces become `_`.
pub fn sanitize_folder_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced.trim().replace(' ', "_")
}

/// Folder name derived from a source path: a directory's name, or a file's stem.
pub fn source_folder_name(source: &Path) -> String {
    let name = if source.is_dir() {
        source.file_name()
    } else {
        source.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Archive entry name for a relative path, always `/`-separated.
pub fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collect_files(root: &Path) -> Vec<PathBuf> {
        walk_source(root)
            .filter_map(|e| match e {
                WalkEntry::File(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_walk_flat_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");

        fs::write(src.join("file1.txt"), b"test data 1").expect("Failed to write file1");
        fs::write(src.join("file2.txt"), b"test data 2").expect("Failed to write file2");

        let files = collect_files(&src);
        assert_eq!(files.len(), 2, "Expected 2 files, got {}", files.len());
    }

    #[test]
    fn test_walk_nested_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let subdir = src.join("subdir");
        fs::create_dir_all(&subdir).expect("Failed to create subdir");

        fs::write(src.join("file1.txt"), b"data1").expect("Failed to write file1");
        fs::write(subdir.join("file2.txt"), b"data2").expect("Failed to write file2");

        let mut files = collect_files(&src);
        files.sort();
        assert_eq!(files, vec![src.join("file1.txt"), subdir.join("file2.txt")]);
    }

    #[test]
    fn test_walk_single_file_root() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("notes.txt");
        fs::write(&file, b"0123456789").expect("Failed to write file");

        assert_eq!(collect_files(&file), vec![file]);
    }

    #[test]
    fn test_walk_nonexistent_root_reports_unreadable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("nonexistent");

        let entries: Vec<_> = walk_source(&missing).collect();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], WalkEntry::Unreadable { .. }));
    }

    #[test]
    fn test_copy_file_with_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("nested").join("dest.txt");

        let mut file = fs::File::create(&src_file).expect("Failed to create source");
        file.write_all(b"test content").expect("Failed to write source");
        drop(file);

        let old = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src_file, old).expect("Failed to set mtime");

        let bytes = copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(&dst_file).expect("Failed to read dest");
        assert_eq!(content, "test content");

        let dst_meta = fs::metadata(&dst_file).expect("Failed to stat dest");
        assert_eq!(filetime::FileTime::from_last_modification_time(&dst_meta), old);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("run.sh");
        let dst_file = temp_dir.path().join("copy.sh");
        fs::write(&src_file, b"#!/bin/sh\n").expect("Failed to write source");
        fs::set_permissions(&src_file, fs::Permissions::from_mode(0o750))
            .expect("Failed to set permissions");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");

        let mode = fs::metadata(&dst_file).expect("Failed to stat dest").permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_copy_missing_source_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = copy_file_with_metadata(
            &temp_dir.path().join("missing.txt"),
            &temp_dir.path().join("out.txt"),
        );
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");

        assert!(temp_dir.path().join("subdir").is_dir());
    }

    #[test]
    fn test_create_dir_all_rejects_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("occupied");
        fs::write(&file, b"x").expect("Failed to write file");

        let result = create_dir_all(&file);
        assert!(matches!(result, Err(EngineError::DirectoryCreationFailed { .. })));
    }

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_folder_name("My Docs"), "My_Docs");
        assert_eq!(sanitize_folder_name("  photos/2024: raw  "), "photos_2024__raw");
        assert_eq!(sanitize_folder_name("a-b_c"), "a-b_c");
    }

    #[test]
    fn test_source_folder_name() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("projects");
        fs::create_dir(&dir).expect("Failed to create dir");
        let file = temp_dir.path().join("report.final.pdf");
        fs::write(&file, b"x").expect("Failed to write file");

        assert_eq!(source_folder_name(&dir), "projects");
        assert_eq!(source_folder_name(&file), "report.final");
    }

    #[test]
    fn test_entry_name_uses_forward_slashes() {
        let relative = Path::new("sub").join("deeper").join("file.txt");
        assert_eq!(entry_name(&relative), "sub/deeper/file.txt");
    }
}
