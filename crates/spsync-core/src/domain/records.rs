//! Records describing local files, remote state, and per-file outcomes

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;
use super::paths::path_key;
use super::stats::Counter;

// ============================================================================
// Local side
// ============================================================================

/// A file selected for synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub absolute_path: PathBuf,
    pub size: u64,
    /// Advisory only; never used for change detection.
    pub modified: Option<DateTime<Utc>>,
    /// Normalized path relative to the batch base path.
    pub relative_path: String,
}

// ============================================================================
// Remote side
// ============================================================================

/// A remote file as seen in the cache or returned by a point query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRecord {
    pub item_id: String,
    pub parent_id: Option<String>,
    /// Id of the backing list item; required for `FileHash` writes.
    pub list_item_id: Option<String>,
    pub size: Option<u64>,
    pub fingerprint: Option<Fingerprint>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolderRecord {
    pub item_id: String,
    pub name: String,
}

/// Everything under the upload root, keyed by [`path_key`] of the
/// normalized relative path.
///
/// Built once before uploads start and read-only afterwards. When the build
/// fails the snapshot is empty and `available` is false, so every lookup
/// falls through to a point query.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    pub files: HashMap<String, RemoteFileRecord>,
    pub folders: HashMap<String, RemoteFolderRecord>,
    pub available: bool,
}

impl RemoteSnapshot {
    /// Snapshot for a failed or skipped build.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn insert_file(&mut self, rel_path: &str, record: RemoteFileRecord) {
        self.files.insert(path_key(rel_path), record);
    }

    pub fn insert_folder(&mut self, rel_path: &str, record: RemoteFolderRecord) {
        self.folders.insert(path_key(rel_path), record);
    }

    pub fn file(&self, rel_path: &str) -> Option<&RemoteFileRecord> {
        self.files.get(&path_key(rel_path))
    }

    pub fn folder(&self, rel_path: &str) -> Option<&RemoteFolderRecord> {
        self.folders.get(&path_key(rel_path))
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Local and remote fingerprints are equal.
    HashMatch,
    /// No usable remote fingerprint; sizes are equal.
    SizeMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    New,
    Changed,
    /// The remote state could not be read; uploading is the safe choice.
    Unknown,
}

/// Result of processing one local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Skipped(SkipReason),
    /// Uploaded where no file was known to exist.
    Created,
    /// Uploaded over an existing file.
    Replaced,
    Failed(String),
}

impl UploadOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The per-file counter this outcome increments.
    pub fn counter(&self) -> Counter {
        match self {
            Self::Skipped(_) => Counter::SkippedFiles,
            Self::Created => Counter::NewFiles,
            Self::Replaced => Counter::ReplacedFiles,
            Self::Failed(_) => Counter::FailedFiles,
        }
    }
}

/// A `FileHash` write waiting for the end-of-run batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMetadataWrite {
    pub parent_id: String,
    pub filename: String,
    /// Absent when the upload response did not carry a list item.
    pub list_item_id: Option<String>,
    pub fingerprint: Fingerprint,
    /// The file existed before this run.
    pub is_update: bool,
    /// Relative path used in log output.
    pub display_path: String,
}
