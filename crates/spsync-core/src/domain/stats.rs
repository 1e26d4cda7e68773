//! Run statistics
//!
//! [`SyncStatistics`] is shared by every worker. Each counter is its own
//! `AtomicU64`, so concurrent increments are never lost; the only read path
//! is [`SyncStatistics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// One counter of [`SyncStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    NewFiles,
    ReplacedFiles,
    SkippedFiles,
    FailedFiles,
    DeletedFiles,
    BytesUploaded,
    BytesSkipped,
    ComparedByHash,
    ComparedBySize,
    HashNewSaved,
    HashUpdated,
    HashMatched,
    HashSaveFailed,
    HashEmptyFound,
    HashColumnUnavailable,
    HashBackfilled,
    HashBackfillFailed,
    CacheHits,
    CacheMisses,
    ApiQueries,
    MdNoChanges,
    MdConverted,
    MdConversionFailed,
    MermaidDiagramsRendered,
    MermaidDiagramsFailed,
}

const COUNTER_COUNT: usize = Counter::MermaidDiagramsFailed as usize + 1;

/// Thread-safe counters for one sync run.
#[derive(Debug, Default)]
pub struct SyncStatistics {
    counters: [AtomicU64; COUNTER_COUNT],
}

impl SyncStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, amount: u64) {
        self.counters[counter as usize].fetch_add(amount, Ordering::Relaxed);
    }

    fn get(&self, counter: Counter) -> u64 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            new_files: self.get(Counter::NewFiles),
            replaced_files: self.get(Counter::ReplacedFiles),
            skipped_files: self.get(Counter::SkippedFiles),
            failed_files: self.get(Counter::FailedFiles),
            deleted_files: self.get(Counter::DeletedFiles),
            bytes_uploaded: self.get(Counter::BytesUploaded),
            bytes_skipped: self.get(Counter::BytesSkipped),
            compared_by_hash: self.get(Counter::ComparedByHash),
            compared_by_size: self.get(Counter::ComparedBySize),
            hash_new_saved: self.get(Counter::HashNewSaved),
            hash_updated: self.get(Counter::HashUpdated),
            hash_matched: self.get(Counter::HashMatched),
            hash_save_failed: self.get(Counter::HashSaveFailed),
            hash_empty_found: self.get(Counter::HashEmptyFound),
            hash_column_unavailable: self.get(Counter::HashColumnUnavailable),
            hash_backfilled: self.get(Counter::HashBackfilled),
            hash_backfill_failed: self.get(Counter::HashBackfillFailed),
            cache_hits: self.get(Counter::CacheHits),
            cache_misses: self.get(Counter::CacheMisses),
            api_queries: self.get(Counter::ApiQueries),
            md_no_changes: self.get(Counter::MdNoChanges),
            md_converted: self.get(Counter::MdConverted),
            md_conversion_failed: self.get(Counter::MdConversionFailed),
            mermaid_diagrams_rendered: self.get(Counter::MermaidDiagramsRendered),
            mermaid_diagrams_failed: self.get(Counter::MermaidDiagramsFailed),
        }
    }
}

/// Plain copy of [`SyncStatistics`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub new_files: u64,
    pub replaced_files: u64,
    pub skipped_files: u64,
    pub failed_files: u64,
    pub deleted_files: u64,
    pub bytes_uploaded: u64,
    pub bytes_skipped: u64,
    pub compared_by_hash: u64,
    pub compared_by_size: u64,
    pub hash_new_saved: u64,
    pub hash_updated: u64,
    pub hash_matched: u64,
    pub hash_save_failed: u64,
    pub hash_empty_found: u64,
    pub hash_column_unavailable: u64,
    pub hash_backfilled: u64,
    pub hash_backfill_failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub api_queries: u64,
    pub md_no_changes: u64,
    pub md_converted: u64,
    pub md_conversion_failed: u64,
    pub mermaid_diagrams_rendered: u64,
    pub mermaid_diagrams_failed: u64,
}

impl StatsSnapshot {
    /// Files that reached a terminal success state (uploaded or skipped).
    pub fn processed(&self) -> u64 {
        self.new_files + self.replaced_files + self.skipped_files
    }

    /// Share of processed files that were already up to date, in percent.
    pub fn efficiency_percent(&self) -> Option<f64> {
        let processed = self.processed();
        (processed > 0).then(|| self.skipped_files as f64 / processed as f64 * 100.0)
    }

    /// Share of cache lookups that hit, in percent.
    pub fn cache_hit_percent(&self) -> Option<f64> {
        let lookups = self.cache_hits + self.cache_misses;
        (lookups > 0).then(|| self.cache_hits as f64 / lookups as f64 * 100.0)
    }

    /// `(by_hash, by_size)` comparison shares, in percent.
    pub fn comparison_split(&self) -> Option<(f64, f64)> {
        let total = self.compared_by_hash + self.compared_by_size;
        (total > 0).then(|| {
            (
                self.compared_by_hash as f64 / total as f64 * 100.0,
                self.compared_by_size as f64 / total as f64 * 100.0,
            )
        })
    }
}

/// Human-readable byte count: `1536` → `"1.5 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}
