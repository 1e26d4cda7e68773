//! Deferred `FileHash` writes
//!
//! Workers queue one [`PendingMetadataWrite`] per upload; the queue is
//! drained once after all uploads. SharePoint keeps freshly uploaded list
//! items locked while it scans or converts them, so writes go out in
//! phases with a grace delay before each and smaller batches on retry:
//!
//! | Phase | Batch | Re-query id |
//! |-------|-------|-------------|
//! | [`Phase::Initial`] | 20 | no |
//! | [`Phase::Retry`] | 10 | yes |
//! | [`Phase::Final`] | 5 | yes |
//!
//! Entries queued without a list item id start at [`Phase::Retry`]. Every
//! entry ends either saved (`hash_new_saved` / `hash_updated`) or failed
//! (`hash_save_failed`), exactly once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spsync_core::domain::{Counter, FileKind, PendingMetadataWrite, SyncStatistics};
use spsync_core::ports::IRemoteLibrary;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Retry,
    Final,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Initial, Phase::Retry, Phase::Final];

    pub fn batch_size(self) -> usize {
        match self {
            Phase::Initial => 20,
            Phase::Retry => 10,
            Phase::Final => 5,
        }
    }

    /// Whether list item ids are looked up again before writing.
    pub fn requeries(self) -> bool {
        !matches!(self, Phase::Initial)
    }
}

/// Grace delays before each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSchedule {
    unit: Duration,
}

impl FlushSchedule {
    /// Delays in whole seconds, sized for SharePoint post-processing.
    pub fn standard() -> Self {
        Self {
            unit: Duration::from_secs(1),
        }
    }

    /// No waiting at all.
    pub fn immediate() -> Self {
        Self { unit: Duration::ZERO }
    }

    /// Wait before `phase` when its entries have the given kinds.
    pub fn grace_delay(&self, phase: Phase, kinds: &[FileKind]) -> Duration {
        let has = |k: FileKind| kinds.contains(&k);
        let units = match phase {
            Phase::Initial => {
                if has(FileKind::Html) {
                    10
                } else if has(FileKind::Pdf) || has(FileKind::Office) {
                    8
                } else if has(FileKind::Image) {
                    5
                } else {
                    0
                }
            }
            Phase::Retry => {
                if has(FileKind::Html) || has(FileKind::Office) {
                    15
                } else if has(FileKind::Pdf) || has(FileKind::Image) {
                    12
                } else {
                    8
                }
            }
            Phase::Final => 20,
        };
        self.unit * units
    }
}

impl Default for FlushSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// Totals of one [`MetadataWriteBatcher::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct MetadataWriteBatcher {
    remote: Arc<dyn IRemoteLibrary>,
    queue: Mutex<Vec<PendingMetadataWrite>>,
    schedule: FlushSchedule,
}

impl MetadataWriteBatcher {
    pub fn new(remote: Arc<dyn IRemoteLibrary>) -> Self {
        Self::with_schedule(remote, FlushSchedule::standard())
    }

    pub fn with_schedule(remote: Arc<dyn IRemoteLibrary>, schedule: FlushSchedule) -> Self {
        Self {
            remote,
            queue: Mutex::new(Vec::new()),
            schedule,
        }
    }

    pub fn enqueue(&self, write: PendingMetadataWrite) {
        self.queue.lock().unwrap().push(write);
    }

    /// Writes queued and not yet flushed.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Drain the queue and write every entry, retrying failures in
    /// smaller batches.
    pub async fn flush(&self, stats: &SyncStatistics) -> FlushReport {
        let pending = std::mem::take(&mut *self.queue.lock().unwrap());
        if pending.is_empty() {
            return FlushReport::default();
        }
        info!(count = pending.len(), "Writing FileHash values");

        let (mut carry, mut deferred): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|w| w.list_item_id.is_some());
        let mut report = FlushReport::default();

        for phase in Phase::ALL {
            if phase == Phase::Retry {
                carry.append(&mut deferred);
            }
            if carry.is_empty() {
                continue;
            }

            let kinds: Vec<FileKind> = carry.iter().map(|w| FileKind::from_name(&w.filename)).collect();
            let delay = self.schedule.grace_delay(phase, &kinds);
            if !delay.is_zero() {
                debug!(?phase, delay_secs = delay.as_secs(), count = carry.len(), "Waiting before FileHash writes");
                tokio::time::sleep(delay).await;
            }

            let mut failed = Vec::new();
            for batch in carry.chunks(phase.batch_size()) {
                failed.extend(self.write_batch(phase, batch, stats, &mut report).await);
            }
            if !failed.is_empty() {
                warn!(?phase, failed = failed.len(), "FileHash writes failed; will retry");
            }
            carry = failed;
        }

        for write in &carry {
            warn!(path = %write.display_path, "FileHash could not be saved");
            stats.incr(Counter::HashSaveFailed);
        }
        report.failed = carry.len();
        info!(succeeded = report.succeeded, failed = report.failed, "FileHash writes finished");
        report
    }

    /// Writes one batch; returns the entries that did not succeed.
    async fn write_batch(
        &self,
        phase: Phase,
        batch: &[PendingMetadataWrite],
        stats: &SyncStatistics,
        report: &mut FlushReport,
    ) -> Vec<PendingMetadataWrite> {
        let mut failed = Vec::new();
        let mut ready = Vec::with_capacity(batch.len());

        for write in batch {
            let id = if phase.requeries() {
                self.requery(write).await
            } else {
                write.list_item_id.clone()
            };
            match id {
                Some(id) => ready.push((write, id)),
                None => failed.push(write.clone()),
            }
        }
        if ready.is_empty() {
            return failed;
        }

        let updates: Vec<_> = ready
            .iter()
            .map(|(w, id)| (id.clone(), w.fingerprint.clone()))
            .collect();
        let results = match self.remote.batch_update_fingerprints(&updates).await {
            Ok(results) => results,
            Err(e) => {
                warn!(?phase, size = updates.len(), error = %format!("{e:#}"), "Batch write failed");
                vec![false; updates.len()]
            }
        };

        for (index, (write, id)) in ready.into_iter().enumerate() {
            if results.get(index).copied().unwrap_or(false) {
                report.succeeded += 1;
                stats.incr(if write.is_update {
                    Counter::HashUpdated
                } else {
                    Counter::HashNewSaved
                });
                debug!(path = %write.display_path, "FileHash saved");
            } else {
                let mut retry = write.clone();
                retry.list_item_id = Some(id);
                failed.push(retry);
            }
        }
        failed
    }

    /// Fresh list item id for `write`, by parent id and file name.
    async fn requery(&self, write: &PendingMetadataWrite) -> Option<String> {
        match self.remote.get_child(&write.parent_id, &write.filename).await {
            Ok(Some(child)) => child.list_item_id.or_else(|| write.list_item_id.clone()),
            Ok(None) => {
                debug!(path = %write.display_path, "Item not found on re-query");
                None
            }
            Err(e) => {
                debug!(path = %write.display_path, error = %e, "Re-query failed");
                None
            }
        }
    }
}
