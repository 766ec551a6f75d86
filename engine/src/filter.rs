//! File inclusion filter.
//!
//! `should_include` decides whether a candidate file takes part in a run. It
//! performs at most one `stat` of the candidate and has no other side effects.

use crate::model::FilterSet;
use std::fs;
use std::path::Path;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Decide whether `path` passes every configured rule in `filters`.
///
/// Rules are evaluated in order and the first failing rule excludes the file:
/// 1. include-extension list (when non-empty)
/// 2. exclude-extension list
/// 3. size bounds in MB (zero bound = unbounded; stat failure excludes)
/// 4. literal substring patterns against the full path
pub fn should_include(path: &Path, filters: &FilterSet) -> bool {
    let extension = file_extension(path);

    if !filters.include_extensions.is_empty() {
        let listed = match &extension {
            Some(ext) => contains_extension(&filters.include_extensions, ext),
            None => false,
        };
        if !listed {
            return false;
        }
    }

    if let Some(ext) = &extension {
        if contains_extension(&filters.exclude_extensions, ext) {
            return false;
        }
    }

    if !within_size_bounds(path, filters) {
        return false;
    }

    let path_str = path.to_string_lossy();
    !filters
        .exclude_patterns
        .iter()
        .any(|pattern| path_str.contains(pattern.as_str()))
}

/// Lower-cased extension without the leading dot.
fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn contains_extension(list: &[String], ext: &str) -> bool {
    list.iter()
        .any(|candidate| candidate.trim_start_matches('.').to_lowercase() == ext)
}

fn within_size_bounds(path: &Path, filters: &FilterSet) -> bool {
    let size_mb = match fs::metadata(path) {
        Ok(metadata) => metadata.len() as f64 / BYTES_PER_MB,
        Err(_) => return false,
    };

    if filters.min_size_mb > 0.0 && size_mb < filters.min_size_mb {
        return false;
    }
    if filters.max_size_mb > 0.0 && size_mb > filters.max_size_mb {
        return false;
    }
    true
}
