//! Shared fixtures: an in-memory document library and local file helpers.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use spsync_core::domain::{AuthRejected, Fingerprint, LocalFile, RemoteSnapshot};
use spsync_core::ports::{
    ChunkOutcome, FolderCreation, IRemoteLibrary, RemoteChild, UploadSession, UploadedItem,
};
use spsync_sync::discovery::Discovery;
use spsync_sync::orchestrator::SyncOptions;

pub const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub is_folder: bool,
    pub content: Vec<u8>,
    pub list_item_id: Option<String>,
    pub fingerprint: Option<Fingerprint>,
}

impl FakeItem {
    fn to_child(&self) -> RemoteChild {
        RemoteChild {
            id: self.id.clone(),
            name: self.name.clone(),
            is_folder: self.is_folder,
            size: (!self.is_folder).then_some(self.content.len() as u64),
            list_item_id: self.list_item_id.clone(),
            fingerprint: self.fingerprint.clone(),
            parent_id: Some(self.parent_id.clone()),
        }
    }
}

#[derive(Default)]
struct State {
    items: HashMap<String, FakeItem>,
    next_id: u64,
    /// upload url -> (parent id, name, bytes received)
    sessions: HashMap<String, (String, String, Vec<u8>)>,
}

impl State {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn child(&self, parent_id: &str, name: &str) -> Option<&FakeItem> {
        self.items
            .values()
            .find(|i| i.parent_id == parent_id && i.name.eq_ignore_ascii_case(name))
    }

    fn put_file(&mut self, parent_id: &str, name: &str, content: Vec<u8>) -> FakeItem {
        if let Some(existing) = self
            .items
            .values_mut()
            .find(|i| i.parent_id == parent_id && i.name.eq_ignore_ascii_case(name) && !i.is_folder)
        {
            existing.content = content;
            // Replacing content keeps the list item and its fields.
            return existing.clone();
        }
        let n = self.alloc();
        let item = FakeItem {
            id: format!("item-{n}"),
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            is_folder: false,
            content,
            list_item_id: Some(n.to_string()),
            fingerprint: None,
        };
        self.items.insert(item.id.clone(), item.clone());
        item
    }

    fn put_folder(&mut self, parent_id: &str, name: &str) -> FakeItem {
        let n = self.alloc();
        let item = FakeItem {
            id: format!("folder-{n}"),
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            is_folder: true,
            content: Vec::new(),
            list_item_id: None,
            fingerprint: None,
        };
        self.items.insert(item.id.clone(), item.clone());
        item
    }
}

fn uploaded(item: &FakeItem) -> UploadedItem {
    // Like Graph, upload responses do not expand the list item.
    UploadedItem {
        id: item.id.clone(),
        name: item.name.clone(),
        size: Some(item.content.len() as u64),
        list_item_id: None,
    }
}

/// In-memory [`IRemoteLibrary`] with call counters and failure switches.
#[derive(Default)]
pub struct FakeLibrary {
    state: Mutex<State>,
    no_hash_column: AtomicBool,
    pub list_calls: AtomicUsize,
    pub get_child_calls: AtomicUsize,
    pub create_folder_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub chunk_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    /// File names whose uploads always fail.
    pub failing_uploads: Mutex<HashSet<String>>,
    /// Item ids whose deletes fail.
    pub failing_deletes: Mutex<HashSet<String>>,
    /// List item id -> remaining write failures (`usize::MAX` = forever).
    pub failing_writes: Mutex<HashMap<String, usize>>,
    /// Number of upcoming batch requests that fail as a whole.
    pub failing_batches: AtomicUsize,
    pub fail_listing: AtomicBool,
    pub fail_get_child: AtomicBool,
    /// Folder names whose first create reports a conflict after a
    /// concurrent creator made them.
    pub racing_folders: Mutex<HashSet<String>>,
    pub slow_folder_create: AtomicBool,
    /// Every call fails as if the app secret had been revoked.
    pub reject_auth: AtomicBool,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_hash_column() -> Self {
        let fake = Self::default();
        fake.no_hash_column.store(true, Ordering::SeqCst);
        fake
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Create every folder of `path` under the root; returns the last id.
    pub fn add_folder(&self, path: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let mut parent = ROOT_ID.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            parent = match state.child(&parent, segment) {
                Some(existing) => existing.id.clone(),
                None => state.put_folder(&parent, segment).id,
            };
        }
        parent
    }

    /// Place a file at `path`, with an optional stored fingerprint.
    pub fn add_file(&self, path: &str, content: &[u8], fingerprint: Option<Fingerprint>) -> FakeItem {
        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path),
        };
        let parent = self.add_folder(dir);
        let mut state = self.state.lock().unwrap();
        let item = state.put_file(&parent, name, content.to_vec());
        let stored = state.items.get_mut(&item.id).expect("just inserted");
        stored.fingerprint = fingerprint;
        stored.clone()
    }

    /// The item at `path` below the root.
    pub fn item_at(&self, path: &str) -> Option<FakeItem> {
        let state = self.state.lock().unwrap();
        let mut parent = ROOT_ID.to_string();
        let mut found = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let item = state.child(&parent, segment)?.clone();
            parent = item.id.clone();
            found = Some(item);
        }
        found
    }

    pub fn file_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|i| !i.is_folder)
            .count()
    }

    pub fn folder_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|i| i.is_folder)
            .count()
    }

    fn check_auth(&self) -> Result<()> {
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(AuthRejected("invalid_client: secret expired".into()).into());
        }
        Ok(())
    }

    fn take_write_failure(&self, list_item_id: &str) -> bool {
        let mut failing = self.failing_writes.lock().unwrap();
        match failing.get_mut(list_item_id) {
            Some(0) | None => false,
            Some(remaining) => {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                true
            }
        }
    }

    fn write_fingerprint(&self, list_item_id: &str, fingerprint: &Fingerprint) -> bool {
        if self.take_write_failure(list_item_id) {
            return false;
        }
        let mut state = self.state.lock().unwrap();
        match state
            .items
            .values_mut()
            .find(|i| i.list_item_id.as_deref() == Some(list_item_id))
        {
            Some(item) => {
                item.fingerprint = Some(fingerprint.clone());
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl IRemoteLibrary for FakeLibrary {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteChild>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_auth()?;
        if self.fail_listing.load(Ordering::SeqCst) {
            bail!("listing failed: 503 Service Unavailable");
        }
        let state = self.state.lock().unwrap();
        if folder_id != ROOT_ID && !state.items.contains_key(folder_id) {
            bail!("folder {folder_id} not found");
        }
        let mut children: Vec<_> = state
            .items
            .values()
            .filter(|i| i.parent_id == folder_id)
            .map(FakeItem::to_child)
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn get_child(&self, parent_id: &str, name: &str) -> Result<Option<RemoteChild>> {
        self.get_child_calls.fetch_add(1, Ordering::SeqCst);
        self.check_auth()?;
        if self.fail_get_child.load(Ordering::SeqCst) {
            bail!("point query failed: 500 Internal Server Error");
        }
        let state = self.state.lock().unwrap();
        Ok(state.child(parent_id, name).map(FakeItem::to_child))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<FolderCreation> {
        self.create_folder_calls.fetch_add(1, Ordering::SeqCst);
        self.check_auth()?;
        if self.slow_folder_create.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let racing = self.racing_folders.lock().unwrap().remove(name);
        let mut state = self.state.lock().unwrap();
        if racing {
            state.put_folder(parent_id, name);
            return Ok(FolderCreation::AlreadyExists);
        }
        if state.child(parent_id, name).is_some() {
            return Ok(FolderCreation::AlreadyExists);
        }
        Ok(FolderCreation::Created(state.put_folder(parent_id, name).to_child()))
    }

    async fn upload_small(&self, parent_id: &str, name: &str, data: Vec<u8>) -> Result<UploadedItem> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.check_auth()?;
        if self.failing_uploads.lock().unwrap().contains(name) {
            bail!("upload of {name} failed: 500 Internal Server Error");
        }
        let mut state = self.state.lock().unwrap();
        let item = state.put_file(parent_id, name, data);
        Ok(uploaded(&item))
    }

    async fn create_upload_session(&self, parent_id: &str, name: &str) -> Result<UploadSession> {
        self.check_auth()?;
        let mut state = self.state.lock().unwrap();
        let n = state.alloc();
        let upload_url = format!("https://upload.fake/session/{n}");
        state
            .sessions
            .insert(upload_url.clone(), (parent_id.to_string(), name.to_string(), Vec::new()));
        Ok(UploadSession {
            upload_url,
            expires_at: None,
        })
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        data: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let (parent_id, name, received) = state
            .sessions
            .get_mut(&session.upload_url)
            .ok_or_else(|| anyhow!("unknown upload session"))?;
        if received.len() as u64 != offset {
            bail!("chunk out of order: expected offset {}, got {offset}", received.len());
        }
        received.extend_from_slice(&data);
        if (received.len() as u64) < total {
            return Ok(ChunkOutcome::Continue);
        }
        let (parent_id, name, content) = (parent_id.clone(), name.clone(), std::mem::take(received));
        state.sessions.remove(&session.upload_url);
        let item = state.put_file(&parent_id, &name, content);
        Ok(ChunkOutcome::Completed(uploaded(&item)))
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().unwrap().contains(item_id) {
            bail!("delete of {item_id} failed: 423 Locked");
        }
        let mut state = self.state.lock().unwrap();
        state
            .items
            .remove(item_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("item {item_id} not found"))
    }

    async fn update_fingerprint(&self, list_item_id: &str, fingerprint: &Fingerprint) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.write_fingerprint(list_item_id, fingerprint) {
            Ok(())
        } else {
            bail!("write to list item {list_item_id} failed: 409 Conflict")
        }
    }

    async fn batch_update_fingerprints(&self, updates: &[(String, Fingerprint)]) -> Result<Vec<bool>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.failing_batches.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_batches.store(pending_failures - 1, Ordering::SeqCst);
            bail!("$batch failed: 503 Service Unavailable");
        }
        Ok(updates
            .iter()
            .map(|(id, fp)| self.write_fingerprint(id, fp))
            .collect())
    }

    fn hash_column_available(&self) -> bool {
        !self.no_hash_column.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Local helpers
// ============================================================================

/// Write `files` (relative path, text) under `base` and describe them.
pub fn write_local(base: &Path, files: &[(&str, &str)]) -> Vec<LocalFile> {
    files
        .iter()
        .map(|(rel, content)| write_bytes(base, rel, content.as_bytes()))
        .collect()
}

pub fn write_bytes(base: &Path, rel: &str, content: &[u8]) -> LocalFile {
    let path = base.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    LocalFile {
        absolute_path: path,
        size: content.len() as u64,
        modified: None,
        relative_path: rel.to_string(),
    }
}

pub fn discovery(base: &Path, files: Vec<LocalFile>) -> Discovery {
    Discovery {
        files,
        base_path: base.to_path_buf(),
    }
}

/// Options with no pauses between attempts.
pub fn options() -> SyncOptions {
    SyncOptions {
        workers: 4,
        max_retry: 3,
        retry_pause: Duration::ZERO,
        slow_down_pause: Duration::ZERO,
        force_upload: false,
        convert_markdown: true,
        force_md_regeneration: false,
        sync_delete: false,
        whatif: false,
        host: "contoso.sharepoint.com".into(),
        site_name: "Team".into(),
        upload_path: "Documents/Reports".into(),
    }
}

pub async fn snapshot_of(fake: &FakeLibrary) -> RemoteSnapshot {
    spsync_sync::cache::build_snapshot(fake, ROOT_ID).await
}
