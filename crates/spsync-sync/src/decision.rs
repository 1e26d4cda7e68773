//! Upload-or-skip decision per file
//!
//! ## Precedence
//!
//! 1. Force mode always uploads; existence is only looked up to tell a
//!    replacement from a new file.
//! 2. Snapshot hit: compare fingerprints when both sides have one and the
//!    library has a `FileHash` column, otherwise compare sizes.
//! 3. Snapshot miss: point query by parent id and name, then as in 2.
//! 4. Anything undecidable uploads. When existence itself is unknown the
//!    reason is [`UploadReason::Unknown`] and the upload counts as new.
//!
//! A size-equal skip with a known list item writes the local fingerprint
//! back immediately, so the next run can compare by hash without uploading.

use std::path::PathBuf;
use std::sync::Arc;

use spsync_core::domain::paths::split_parent;
use spsync_core::domain::{
    fingerprint_file, Counter, Fingerprint, LocalFile, RemoteFileRecord, RemoteSnapshot,
    SkipReason, SyncStatistics, UploadReason,
};
use spsync_core::ports::IRemoteLibrary;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload(UploadReason),
    Skip(SkipReason),
}

/// Outcome of [`DecisionEngine::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    /// Local fingerprint, when one was computed or supplied.
    pub fingerprint: Option<Fingerprint>,
    /// The remote record the decision was made against.
    pub existing: Option<RemoteFileRecord>,
}

impl Decision {
    pub fn should_upload(&self) -> bool {
        matches!(self.action, Action::Upload(_))
    }

    /// Whether an upload replaces a file known to exist.
    pub fn is_update(&self) -> bool {
        matches!(self.action, Action::Upload(UploadReason::Changed))
    }
}

/// Compares local files against the snapshot or point queries.
pub struct DecisionEngine {
    remote: Arc<dyn IRemoteLibrary>,
    snapshot: Arc<RemoteSnapshot>,
    stats: Arc<SyncStatistics>,
}

impl DecisionEngine {
    pub fn new(
        remote: Arc<dyn IRemoteLibrary>,
        snapshot: Arc<RemoteSnapshot>,
        stats: Arc<SyncStatistics>,
    ) -> Self {
        Self {
            remote,
            snapshot,
            stats,
        }
    }

    /// Decide whether `local` must be uploaded to `target_path`.
    ///
    /// `target_path` is the sanitized relative path in the library and
    /// `parent_id` the id of its folder, when known. `precomputed` replaces
    /// the fingerprint of `local`, which the Markdown flow uses to compare
    /// the generated page against its source.
    pub async fn decide(
        &self,
        local: &LocalFile,
        target_path: &str,
        parent_id: Option<&str>,
        precomputed: Option<Fingerprint>,
        force: bool,
    ) -> Decision {
        let column = self.remote.hash_column_available();
        let fingerprint = match precomputed {
            Some(fp) => Some(fp),
            None if column => self.local_fingerprint(local).await,
            None => None,
        };

        if force {
            let (reason, existing) = upload_target(self.lookup(target_path, parent_id).await);
            debug!(path = target_path, ?reason, "Force upload");
            return upload(reason, fingerprint, existing);
        }

        if column && fingerprint.is_none() {
            let (reason, existing) = upload_target(self.lookup(target_path, parent_id).await);
            return upload(reason, None, existing);
        }

        match self.lookup(target_path, parent_id).await {
            Lookup::Found(record) => self.compare(local, target_path, fingerprint, record).await,
            Lookup::Absent => {
                debug!(path = target_path, "Not found remotely");
                upload(UploadReason::New, fingerprint, None)
            }
            Lookup::Unknown => upload(UploadReason::Unknown, fingerprint, None),
        }
    }

    fn lookup_snapshot(&self, target_path: &str) -> Option<RemoteFileRecord> {
        if !self.snapshot.available {
            return None;
        }
        match self.snapshot.file(target_path) {
            Some(record) => {
                self.stats.incr(Counter::CacheHits);
                Some(record.clone())
            }
            None => {
                self.stats.incr(Counter::CacheMisses);
                None
            }
        }
    }

    /// Snapshot first, then a point query under `parent_id`.
    async fn lookup(&self, target_path: &str, parent_id: Option<&str>) -> Lookup {
        if let Some(record) = self.lookup_snapshot(target_path) {
            return Lookup::Found(record);
        }
        let Some(parent_id) = parent_id else {
            debug!(path = target_path, "No parent id for point query; uploading");
            return Lookup::Unknown;
        };
        let (_, name) = split_parent(target_path);
        self.stats.incr(Counter::ApiQueries);
        match self.remote.get_child(parent_id, name).await {
            Ok(Some(child)) => Lookup::Found(child.into_file_record()),
            Ok(None) => Lookup::Absent,
            Err(e) => {
                warn!(path = target_path, error = %format!("{e:#}"), "Point query failed; uploading");
                Lookup::Unknown
            }
        }
    }

    async fn compare(
        &self,
        local: &LocalFile,
        target_path: &str,
        fingerprint: Option<Fingerprint>,
        record: RemoteFileRecord,
    ) -> Decision {
        let column = self.remote.hash_column_available();

        if column {
            if let (Some(local_fp), Some(remote_fp)) = (&fingerprint, &record.fingerprint) {
                self.stats.incr(Counter::ComparedByHash);
                if local_fp == remote_fp {
                    self.stats.incr(Counter::HashMatched);
                    debug!(path = target_path, "Fingerprint match; skipping");
                    return self.skip(local, SkipReason::HashMatch, fingerprint, record);
                }
                debug!(path = target_path, "Fingerprint differs");
                return upload(UploadReason::Changed, fingerprint, Some(record));
            }
            self.stats.incr(Counter::HashEmptyFound);
        } else {
            self.stats.incr(Counter::HashColumnUnavailable);
        }

        let Some(remote_size) = record.size else {
            return upload(UploadReason::Changed, fingerprint, Some(record));
        };
        self.stats.incr(Counter::ComparedBySize);
        if remote_size != local.size {
            debug!(path = target_path, local = local.size, remote = remote_size, "Size differs");
            return upload(UploadReason::Changed, fingerprint, Some(record));
        }

        if column {
            if let (Some(fp), Some(list_item_id)) = (&fingerprint, &record.list_item_id) {
                self.backfill(target_path, list_item_id, fp).await;
            }
        }
        debug!(path = target_path, "Size match; skipping");
        self.skip(local, SkipReason::SizeMatch, fingerprint, record)
    }

    async fn backfill(&self, target_path: &str, list_item_id: &str, fingerprint: &Fingerprint) {
        match self.remote.update_fingerprint(list_item_id, fingerprint).await {
            Ok(()) => {
                self.stats.incr(Counter::HashBackfilled);
                debug!(path = target_path, "FileHash backfilled");
            }
            Err(e) => {
                self.stats.incr(Counter::HashBackfillFailed);
                warn!(path = target_path, error = %format!("{e:#}"), "FileHash backfill failed");
            }
        }
    }

    fn skip(
        &self,
        local: &LocalFile,
        reason: SkipReason,
        fingerprint: Option<Fingerprint>,
        record: RemoteFileRecord,
    ) -> Decision {
        self.stats.add(Counter::BytesSkipped, local.size);
        Decision {
            action: Action::Skip(reason),
            fingerprint,
            existing: Some(record),
        }
    }

    async fn local_fingerprint(&self, local: &LocalFile) -> Option<Fingerprint> {
        let path: PathBuf = local.absolute_path.clone();
        match tokio::task::spawn_blocking(move || fingerprint_file(&path)).await {
            Ok(Ok(fp)) => Some(fp),
            Ok(Err(e)) => {
                warn!(path = %local.absolute_path.display(), error = %e, "Cannot fingerprint file; uploading");
                None
            }
            Err(e) => {
                warn!(path = %local.absolute_path.display(), error = %e, "Fingerprint task failed");
                None
            }
        }
    }
}

/// Remote state of one target path.
enum Lookup {
    Found(RemoteFileRecord),
    Absent,
    /// The snapshot missed and no point query could answer.
    Unknown,
}

fn upload_target(lookup: Lookup) -> (UploadReason, Option<RemoteFileRecord>) {
    match lookup {
        Lookup::Found(record) => (UploadReason::Changed, Some(record)),
        Lookup::Absent => (UploadReason::New, None),
        Lookup::Unknown => (UploadReason::Unknown, None),
    }
}

fn upload(
    reason: UploadReason,
    fingerprint: Option<Fingerprint>,
    existing: Option<RemoteFileRecord>,
) -> Decision {
    Decision {
        action: Action::Upload(reason),
        fingerprint,
        existing,
    }
}
