//! Checksum computation for finished backups.
//!
//! A backup artifact is either one file (the zip archive) or a directory (the
//! mirrored tree). Both are reduced to a single hex SHA-256 digest:
//! - a file hashes its bytes
//! - a directory hashes the concatenated bytes of every file below it, in
//!   sorted path order, so the digest is reproducible run to run

use crate::error::EngineError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const BUFFER_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 of a backup artifact (file or directory).
pub fn compute_backup_checksum(path: &Path) -> Result<String, EngineError> {
    let mut hasher = Sha256::new();

    if path.is_file() {
        hash_file_into(&mut hasher, path)?;
    } else {
        for file in sorted_files(path)? {
            hash_file_into(&mut hasher, &file)?;
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the SHA-256 of a single file.
pub fn compute_file_checksum(path: &Path) -> Result<String, EngineError> {
    let mut hasher = Sha256::new();
    hash_file_into(&mut hasher, path)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_file_into(hasher: &mut Sha256, path: &Path) -> Result<(), EngineError> {
    let mut file = File::open(path).map_err(|e| EngineError::ChecksumFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                return Err(EngineError::ChecksumFailed {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }
    Ok(())
}

/// Every file under `root`, ordered by full path (component-wise).
fn sorted_files(root: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| EngineError::ChecksumFailed {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if path.is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
