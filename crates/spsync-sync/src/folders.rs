//! Folder resolution with per-path memoization
//!
//! Every worker resolves the folder of its file through one shared
//! [`FolderResolver`]. Each prefix of a path is resolved once per run:
//! runtime memo, then the snapshot, then a listing of the parent, and only
//! then a create. Concurrent callers for the same prefix wait on a per-path
//! lock so exactly one of them talks to the remote.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use spsync_core::domain::paths::{path_key, sanitize_name};
use spsync_core::domain::RemoteSnapshot;
use spsync_core::ports::{FolderCreation, IRemoteLibrary};
use tokio::sync::Mutex;
use tracing::debug;

pub struct FolderResolver {
    remote: Arc<dyn IRemoteLibrary>,
    snapshot: Arc<RemoteSnapshot>,
    root_id: String,
    /// `path_key` of the sanitized relative path -> folder item id
    memo: DashMap<String, String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FolderResolver {
    pub fn new(remote: Arc<dyn IRemoteLibrary>, snapshot: Arc<RemoteSnapshot>, root_id: impl Into<String>) -> Self {
        Self {
            remote,
            snapshot,
            root_id: root_id.into(),
            memo: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Id of the folder at `rel_dir` under the upload root, creating any
    /// missing segment. An empty path is the root itself.
    pub async fn ensure(&self, rel_dir: &str) -> Result<String> {
        let mut parent_id = self.root_id.clone();
        let mut prefix = String::new();

        for raw in rel_dir.split('/').filter(|s| !s.is_empty()) {
            let name = sanitize_name(raw, true);
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(&name);
            parent_id = self.ensure_segment(&prefix, &parent_id, &name).await?;
        }

        Ok(parent_id)
    }

    async fn ensure_segment(&self, path: &str, parent_id: &str, name: &str) -> Result<String> {
        let key = path_key(path);
        if let Some(id) = self.memo.get(&key) {
            return Ok(id.clone());
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have finished while we waited.
        if let Some(id) = self.memo.get(&key) {
            return Ok(id.clone());
        }

        let id = match self.snapshot.folder(path) {
            Some(record) => record.item_id.clone(),
            None => self.find_or_create(parent_id, name).await?,
        };
        debug!(path, id = %id, "Folder resolved");
        self.memo.insert(key, id.clone());
        Ok(id)
    }

    async fn find_or_create(&self, parent_id: &str, name: &str) -> Result<String> {
        if let Some(id) = self.find_existing(parent_id, name).await? {
            return Ok(id);
        }

        match self.remote.create_folder(parent_id, name).await? {
            FolderCreation::Created(child) => Ok(child.id),
            FolderCreation::AlreadyExists => {
                debug!(name, "Folder created concurrently; adopting it");
                match self.find_existing(parent_id, name).await? {
                    Some(id) => Ok(id),
                    None => bail!("Folder '{name}' reported as existing but was not listed"),
                }
            }
        }
    }

    async fn find_existing(&self, parent_id: &str, name: &str) -> Result<Option<String>> {
        let children = self
            .remote
            .list_children(parent_id)
            .await
            .with_context(|| format!("Failed to list folder {parent_id}"))?;
        Ok(children
            .into_iter()
            .find(|c| c.is_folder && c.name.eq_ignore_ascii_case(name))
            .map(|c| c.id))
    }
}
