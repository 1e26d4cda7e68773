//! Parallel sync run
//!
//! ## Run Flow
//!
//! 1. **Snapshot**: list the upload root once (skipped when every file is
//!    force-uploaded and mirror deletion is off)
//! 2. **Markdown phase**: convert `.md` files to HTML pages and upload them
//! 3. **Plain phase**: every other file
//! 4. **Metadata**: flush queued `FileHash` writes
//! 5. **Mirror**: delete or report remote files with no local counterpart
//!
//! Within a phase each file is its own task; a semaphore keeps at most
//! `workers` of them talking to the library. A failing file never stops
//! the run, but rejected credentials do: files not yet started are left
//! alone and the metadata and mirror steps are skipped.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use spsync_core::config::Config;
use spsync_core::domain::paths::{
    is_markdown, md_to_html_target, normalize_rel_path, sanitize_path_components, split_parent,
};
use spsync_core::domain::{
    fingerprint_file, AuthRejected, Counter, Fingerprint, LocalFile, PendingMetadataWrite,
    RemoteSnapshot, StatsSnapshot, SyncStatistics, UploadOutcome,
};
use spsync_core::ports::{IMarkdownConverter, IRemoteLibrary, LinkContext, UploadedItem};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::batcher::{FlushReport, FlushSchedule, MetadataWriteBatcher};
use crate::cache::build_snapshot;
use crate::decision::{Action, Decision, DecisionEngine};
use crate::discovery::Discovery;
use crate::executor::UploadExecutor;
use crate::folders::FolderResolver;
use crate::reconcile;

const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(2);
const DEFAULT_SLOW_DOWN_PAUSE: Duration = Duration::from_secs(1);

/// Run settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub workers: usize,
    /// Attempts per file, at least one.
    pub max_retry: u32,
    pub retry_pause: Duration,
    pub slow_down_pause: Duration,
    pub force_upload: bool,
    pub convert_markdown: bool,
    pub force_md_regeneration: bool,
    pub sync_delete: bool,
    pub whatif: bool,
    pub host: String,
    pub site_name: String,
    pub upload_path: String,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.effective_workers(),
            max_retry: config.sync.max_retry,
            retry_pause: DEFAULT_RETRY_PAUSE,
            slow_down_pause: DEFAULT_SLOW_DOWN_PAUSE,
            force_upload: config.sync.force_upload,
            convert_markdown: config.markdown.convert_to_html,
            force_md_regeneration: config.markdown.force_regeneration,
            sync_delete: config.sync.sync_delete,
            whatif: config.sync.sync_delete_whatif,
            host: config.site.host.clone(),
            site_name: config.site.name.clone(),
            upload_path: config.sync.upload_path.clone(),
        }
    }

    pub fn needs_snapshot(&self) -> bool {
        !self.force_upload || self.sync_delete
    }

    /// Whether generated HTML pages are uploaded regardless of state.
    pub fn force_html(&self) -> bool {
        self.force_upload || self.force_md_regeneration
    }
}

/// A file that could not be synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Result of [`SyncOrchestrator::run`].
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub stats: StatsSnapshot,
    pub failures: Vec<FailedFile>,
    pub metadata: FlushReport,
    /// Orphans deleted, or listed in preview mode.
    pub orphans: usize,
    pub whatif: bool,
    pub snapshot_available: bool,
    /// Set when the run stopped early on rejected credentials.
    pub aborted: Option<String>,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.stats.failed_files > 0 || self.aborted.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFlow {
    Markdown,
    Plain,
}

pub struct SyncOrchestrator {
    remote: Arc<dyn IRemoteLibrary>,
    converter: Arc<dyn IMarkdownConverter>,
    root_id: String,
    options: SyncOptions,
    schedule: FlushSchedule,
    executor_limits: Option<(u64, u64)>,
}

impl SyncOrchestrator {
    pub fn new(
        remote: Arc<dyn IRemoteLibrary>,
        converter: Arc<dyn IMarkdownConverter>,
        root_id: impl Into<String>,
        options: SyncOptions,
    ) -> Self {
        Self {
            remote,
            converter,
            root_id: root_id.into(),
            options,
            schedule: FlushSchedule::standard(),
            executor_limits: None,
        }
    }

    pub fn with_flush_schedule(mut self, schedule: FlushSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Override the large-file threshold and chunk size.
    pub fn with_upload_limits(mut self, threshold: u64, chunk_size: u64) -> Self {
        self.executor_limits = Some((threshold, chunk_size));
        self
    }

    /// Sync every discovered file.
    pub async fn run(&self, discovery: &Discovery) -> SyncReport {
        let start = Instant::now();
        let stats = Arc::new(SyncStatistics::new());

        let snapshot = if self.options.needs_snapshot() {
            build_snapshot(self.remote.as_ref(), &self.root_id).await
        } else {
            debug!("Force upload without mirror; skipping remote snapshot");
            RemoteSnapshot::unavailable()
        };
        let snapshot = Arc::new(snapshot);

        let mut executor = UploadExecutor::new(Arc::clone(&self.remote));
        if let Some((threshold, chunk_size)) = self.executor_limits {
            executor = executor.with_threshold(threshold).with_chunk_size(chunk_size);
        }

        let worker = Arc::new(Worker {
            remote: Arc::clone(&self.remote),
            converter: Arc::clone(&self.converter),
            decisions: DecisionEngine::new(
                Arc::clone(&self.remote),
                Arc::clone(&snapshot),
                Arc::clone(&stats),
            ),
            folders: FolderResolver::new(
                Arc::clone(&self.remote),
                Arc::clone(&snapshot),
                self.root_id.clone(),
            ),
            executor,
            batcher: MetadataWriteBatcher::with_schedule(Arc::clone(&self.remote), self.schedule),
            stats: Arc::clone(&stats),
            options: self.options.clone(),
            failures: Mutex::new(Vec::new()),
            fallback_targets: Mutex::new(Vec::new()),
            aborted: Mutex::new(None),
        });

        let (markdown, plain): (Vec<LocalFile>, Vec<LocalFile>) = discovery
            .files
            .iter()
            .cloned()
            .partition(|f| self.options.convert_markdown && is_markdown(&f.relative_path));

        if !markdown.is_empty() {
            info!(count = markdown.len(), "Converting Markdown files");
            self.run_phase(&worker, markdown, FileFlow::Markdown).await;
        }
        if worker.abort_reason().is_none() {
            info!(count = plain.len(), workers = self.options.workers, "Uploading files");
            self.run_phase(&worker, plain, FileFlow::Plain).await;
        }

        let aborted = worker.abort_reason();
        let metadata = match &aborted {
            Some(reason) => {
                error!(
                    reason = %reason,
                    dropped_writes = worker.batcher.pending(),
                    "Run aborted; skipping FileHash writes and mirror deletion"
                );
                FlushReport::default()
            }
            None => worker.batcher.flush(&stats).await,
        };

        let mut orphans = 0;

        if self.options.sync_delete && aborted.is_none() {
            if snapshot.available {
                let mut local: HashSet<String> =
                    reconcile::local_relpaths(&discovery.files, self.options.convert_markdown);
                // Sources uploaded raw after a failed conversion live under
                // their own name.
                local.extend(worker.fallback_targets.lock().unwrap().drain(..));
                orphans = reconcile::reconcile(
                    self.remote.as_ref(),
                    &local,
                    &snapshot.files,
                    self.options.whatif,
                    &stats,
                )
                .await;
            } else {
                warn!("Remote snapshot unavailable; skipping orphan deletion");
            }
        }

        let failures = std::mem::take(&mut *worker.failures.lock().unwrap());
        let report = SyncReport {
            stats: stats.snapshot(),
            failures,
            metadata,
            orphans,
            whatif: self.options.whatif,
            snapshot_available: snapshot.available,
            aborted,
            elapsed: start.elapsed(),
        };
        info!(
            processed = report.stats.processed(),
            failed = report.stats.failed_files,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Sync finished"
        );
        report
    }

    async fn run_phase(&self, worker: &Arc<Worker>, files: Vec<LocalFile>, flow: FileFlow) {
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut tasks = JoinSet::new();

        for file in files {
            let worker = Arc::clone(worker);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return None;
                };
                if worker.abort_reason().is_some() {
                    return None;
                }
                Some(worker.process(file, flow).await)
            });
        }

        let mut not_started = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => worker.stats.incr(outcome.counter()),
                Ok(None) => not_started += 1,
                Err(e) => {
                    error!(error = %e, "Upload task panicked");
                    worker.stats.incr(Counter::FailedFiles);
                }
            }
        }
        if not_started > 0 {
            warn!(?flow, not_started, "Files left unsynced after abort");
        }
    }
}

/// State shared by every file task of one run.
struct Worker {
    remote: Arc<dyn IRemoteLibrary>,
    converter: Arc<dyn IMarkdownConverter>,
    decisions: DecisionEngine,
    folders: FolderResolver,
    executor: UploadExecutor,
    batcher: MetadataWriteBatcher,
    stats: Arc<SyncStatistics>,
    options: SyncOptions,
    failures: Mutex<Vec<FailedFile>>,
    /// Raw `.md` targets uploaded after a failed conversion.
    fallback_targets: Mutex<Vec<String>>,
    aborted: Mutex<Option<String>>,
}

impl Worker {
    fn abort_reason(&self) -> Option<String> {
        self.aborted.lock().unwrap().clone()
    }

    async fn process(&self, file: LocalFile, flow: FileFlow) -> UploadOutcome {
        let result = match flow {
            FileFlow::Markdown => match self.sync_markdown(&file).await {
                Err(e) if !AuthRejected::is_cause_of(&e) => {
                    error!(path = %file.relative_path, error = %format!("{e:#}"), "Markdown conversion failed; uploading source");
                    self.stats.incr(Counter::MdConversionFailed);
                    self.fallback_targets
                        .lock()
                        .unwrap()
                        .push(sanitize_path_components(&file.relative_path));
                    self.sync_plain(&file).await
                }
                result => result,
            },
            FileFlow::Plain => self.sync_plain(&file).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = format!("{e:#}");
                if AuthRejected::is_cause_of(&e) {
                    self.aborted.lock().unwrap().get_or_insert_with(|| error.clone());
                }
                error!(path = %file.relative_path, error = %error, "File failed");
                self.failures.lock().unwrap().push(FailedFile {
                    path: file.relative_path.clone(),
                    error: error.clone(),
                });
                UploadOutcome::Failed(error)
            }
        }
    }

    async fn sync_plain(&self, file: &LocalFile) -> Result<UploadOutcome> {
        let target = sanitize_path_components(&file.relative_path);
        let (dir, name) = split_parent(&target);
        let parent_id = self
            .with_retry(&target, || self.folders.ensure(dir))
            .await
            .with_context(|| format!("Failed to resolve folder '{dir}'"))?;

        let decision = self
            .decisions
            .decide(file, &target, Some(&parent_id), None, self.options.force_upload)
            .await;
        if let Action::Skip(reason) = decision.action {
            return Ok(UploadOutcome::Skipped(reason));
        }

        let item = self
            .with_retry(&target, || {
                self.executor
                    .upload(&parent_id, name, &file.absolute_path, file.size)
            })
            .await?;
        Ok(self
            .record_upload(&target, &parent_id, name, &decision, &item, file.size)
            .await)
    }

    async fn sync_markdown(&self, file: &LocalFile) -> Result<UploadOutcome> {
        let target = md_to_html_target(&sanitize_path_components(&file.relative_path));
        let (dir, name) = split_parent(&target);
        let parent_id = self
            .with_retry(&target, || self.folders.ensure(dir))
            .await
            .with_context(|| format!("Failed to resolve folder '{dir}'"))?;

        let source_fingerprint = fingerprint_source(file).await?;
        let decision = self
            .decisions
            .decide(
                file,
                &target,
                Some(&parent_id),
                Some(source_fingerprint),
                self.options.force_html(),
            )
            .await;
        if let Action::Skip(reason) = decision.action {
            debug!(path = %target, "Markdown source unchanged");
            self.stats.incr(Counter::MdNoChanges);
            return Ok(UploadOutcome::Skipped(reason));
        }

        let markdown = tokio::fs::read_to_string(&file.absolute_path)
            .await
            .with_context(|| format!("Failed to read {}", file.absolute_path.display()))?;
        let context = LinkContext {
            host: self.options.host.clone(),
            site_name: self.options.site_name.clone(),
            upload_path: self.options.upload_path.clone(),
            source_rel_path: normalize_rel_path(&file.relative_path),
        };
        let document = self.converter.convert(&markdown, &context).await?;
        self.stats
            .add(Counter::MermaidDiagramsRendered, document.diagrams_rendered);
        self.stats
            .add(Counter::MermaidDiagramsFailed, document.diagrams_failed);

        let html = document.html.into_bytes();
        let size = html.len() as u64;
        let item = self
            .with_retry(&target, || {
                self.executor.upload_bytes(&parent_id, name, html.clone())
            })
            .await?;
        let outcome = self
            .record_upload(&target, &parent_id, name, &decision, &item, size)
            .await;
        self.stats.incr(Counter::MdConverted);
        Ok(outcome)
    }

    /// Count the bytes, queue the `FileHash` write, and name the outcome.
    async fn record_upload(
        &self,
        target: &str,
        parent_id: &str,
        name: &str,
        decision: &Decision,
        item: &UploadedItem,
        bytes: u64,
    ) -> UploadOutcome {
        let outcome = if decision.is_update() {
            UploadOutcome::Replaced
        } else {
            UploadOutcome::Created
        };
        self.stats.add(Counter::BytesUploaded, bytes);
        info!(path = target, bytes, replaced = decision.is_update(), "Uploaded");

        if !self.remote.hash_column_available() {
            return outcome;
        }
        let Some(fingerprint) = decision.fingerprint.clone() else {
            return outcome;
        };

        // Upload responses rarely carry the list item; look it up once.
        let list_item_id = match &item.list_item_id {
            Some(id) => Some(id.clone()),
            None => {
                self.stats.incr(Counter::ApiQueries);
                match self.remote.get_child(parent_id, name).await {
                    Ok(child) => child.and_then(|c| c.list_item_id),
                    Err(e) => {
                        debug!(path = target, error = %e, "List item lookup failed; deferring");
                        None
                    }
                }
            }
        };

        self.batcher.enqueue(PendingMetadataWrite {
            parent_id: parent_id.to_string(),
            filename: name.to_string(),
            list_item_id,
            fingerprint,
            is_update: decision.is_update(),
            display_path: target.to_string(),
        });
        outcome
    }

    /// Run `op` up to `max_retry` times, pausing between attempts and
    /// whenever the library asks callers to slow down. Rejected
    /// credentials, here or in another task, end the retries at once.
    async fn with_retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.options.max_retry.max(1);
        let mut attempt = 1;
        loop {
            if self.remote.should_slow_down() {
                debug!(path = what, "Approaching rate limits; pausing");
                tokio::time::sleep(self.options.slow_down_pause).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if AuthRejected::is_cause_of(&e) => return Err(e),
                Err(e) if attempt < attempts && self.abort_reason().is_none() => {
                    warn!(path = what, attempt, max = attempts, error = %format!("{e:#}"), "Retrying");
                    tokio::time::sleep(self.options.retry_pause).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn fingerprint_source(file: &LocalFile) -> Result<Fingerprint> {
    let path = file.absolute_path.clone();
    let fingerprint = tokio::task::spawn_blocking(move || fingerprint_file(&path))
        .await
        .context("Fingerprint task failed")?
        .with_context(|| format!("Failed to fingerprint {}", file.absolute_path.display()))?;
    Ok(fingerprint)
}
