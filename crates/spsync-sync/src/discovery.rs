//! Local file discovery
//!
//! Expands the configured glob, drops excluded paths, and computes the base
//! path that relative remote paths are taken against.
//!
//! Without `recursive`, `**` matches a single path component like `*`.
//! Hidden entries are only matched by patterns that name the leading dot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use spsync_core::domain::paths::relative_to;
use spsync_core::domain::LocalFile;
use tracing::{debug, warn};

use crate::SyncError;

/// Files selected for a run and the root their relative paths start from.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub files: Vec<LocalFile>,
    pub base_path: PathBuf,
}

/// Expand `pattern`, apply `excludes`, and describe every matched file.
pub fn discover(pattern: &str, recursive: bool, excludes: &[String]) -> Result<Discovery, SyncError> {
    let effective = if recursive {
        pattern.to_string()
    } else {
        pattern.replace("**", "*")
    };
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut matched = Vec::new();
    for entry in glob::glob_with(&effective, options)? {
        match entry {
            Ok(path) => matched.push(path),
            Err(e) => warn!(path = %e.path().display(), error = %e.error(), "Skipping unreadable path"),
        }
    }
    let total = matched.len();

    let kept: Vec<PathBuf> = matched
        .into_iter()
        .filter(|p| !should_exclude(&p.to_string_lossy(), excludes))
        .collect();
    if kept.is_empty() {
        return Err(if total > 0 {
            SyncError::AllExcluded {
                pattern: pattern.to_string(),
                count: total,
            }
        } else {
            SyncError::NoMatches(pattern.to_string())
        });
    }
    if total > kept.len() {
        debug!(excluded = total - kept.len(), "Excluded items matching exclusion patterns");
    }

    let (files, dirs): (Vec<PathBuf>, Vec<PathBuf>) = kept.into_iter().partition(|p| p.is_file());
    let dirs: Vec<PathBuf> = dirs.into_iter().filter(|p| p.is_dir()).collect();
    if files.is_empty() {
        return Err(SyncError::NoMatches(pattern.to_string()));
    }

    let base_path = base_path(&files, &dirs);
    let mut local = Vec::with_capacity(files.len());
    for path in files {
        let metadata = std::fs::metadata(&path)?;
        let relative_path =
            relative_to(&path, &base_path).map_err(|_| SyncError::OutsideBase(path.clone()))?;
        local.push(LocalFile {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            relative_path,
            absolute_path: path,
        });
    }

    debug!(files = local.len(), base = %base_path.display(), "Discovered files");
    Ok(Discovery {
        files: local,
        base_path,
    })
}

/// Whether `path` matches any exclusion pattern.
///
/// A pattern is tried against the basename and the whole path. Patterns
/// without wildcards also match any single path component, and a bare
/// extension such as `tmp` means `*.tmp`.
pub fn should_exclude(path: &str, patterns: &[String]) -> bool {
    let normalized = path.replace('\\', "/");
    let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
    let components: Vec<&str> = normalized.split('/').collect();

    patterns.iter().any(|raw| {
        let Ok(pattern) = Pattern::new(raw) else {
            return components.contains(&raw.as_str());
        };
        if pattern.matches(basename) || pattern.matches(&normalized) {
            return true;
        }
        let has_wildcard = raw.contains(['*', '?', '[']);
        if !has_wildcard && components.contains(&raw.as_str()) {
            return true;
        }
        if !raw.starts_with('*') && !raw.starts_with('.') {
            if let Ok(ext) = Pattern::new(&format!("*.{raw}")) {
                return ext.matches(basename);
            }
        }
        false
    })
}

/// Root for relative remote paths.
///
/// The parent of the first matched directory when any directory matched,
/// otherwise the parent of the longest common path of all files.
pub fn base_path(files: &[PathBuf], dirs: &[PathBuf]) -> PathBuf {
    if let Some(first) = dirs.first() {
        return parent_or_empty(first);
    }
    match common_path(files) {
        Some(common) => parent_or_empty(&common),
        None => PathBuf::new(),
    }
}

fn parent_or_empty(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn common_path(paths: &[PathBuf]) -> Option<PathBuf> {
    let (first, rest) = paths.split_first()?;
    let mut common: Vec<_> = first.components().collect();
    for path in rest {
        let shared = common
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(shared);
    }
    Some(common.iter().collect())
}
