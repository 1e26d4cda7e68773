//! Remote metadata snapshot
//!
//! Walks the upload root once before any upload starts and records every
//! file and folder by normalized relative path, compared without case. Each folder costs one
//! paginated listing; file fingerprints arrive with the listing.
//!
//! The snapshot is not refreshed during the run. Files uploaded by this run
//! are therefore unknown to it, which only matters to the orphan pass and is
//! harmless there because those paths are in the local set.

use std::time::Instant;

use anyhow::Result;
use spsync_core::domain::{RemoteFolderRecord, RemoteSnapshot};
use spsync_core::ports::IRemoteLibrary;
use tracing::{debug, info, warn};

/// Build the snapshot of everything under `root_id`.
///
/// Any listing failure degrades the whole snapshot to
/// [`RemoteSnapshot::unavailable`], so every lookup becomes a point query.
pub async fn build_snapshot(remote: &dyn IRemoteLibrary, root_id: &str) -> RemoteSnapshot {
    let start = Instant::now();
    match walk(remote, root_id).await {
        Ok(snapshot) => {
            info!(
                files = snapshot.files.len(),
                folders = snapshot.folders.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Remote snapshot built"
            );
            snapshot
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Remote snapshot failed; falling back to point queries");
            RemoteSnapshot::unavailable()
        }
    }
}

async fn walk(remote: &dyn IRemoteLibrary, root_id: &str) -> Result<RemoteSnapshot> {
    let mut snapshot = RemoteSnapshot {
        available: true,
        ..Default::default()
    };
    // (folder_id, relative path of that folder)
    let mut pending = vec![(root_id.to_string(), String::new())];

    while let Some((folder_id, rel_dir)) = pending.pop() {
        let children = remote.list_children(&folder_id).await?;
        debug!(folder = %rel_dir, count = children.len(), "Snapshot folder listed");

        for child in children {
            let rel_path = if rel_dir.is_empty() {
                child.name.clone()
            } else {
                format!("{rel_dir}/{}", child.name)
            };
            if child.is_folder {
                pending.push((child.id.clone(), rel_path.clone()));
                snapshot.insert_folder(
                    &rel_path,
                    RemoteFolderRecord {
                        item_id: child.id,
                        name: child.name,
                    },
                );
            } else {
                snapshot.insert_file(&rel_path, child.into_file_record());
            }
        }
    }

    Ok(snapshot)
}
