//! Mirror-mode orphan deletion
//!
//! After uploads, every file in the remote snapshot whose relative path has
//! no local counterpart is an orphan. Paths are compared after the same
//! sanitization and `.md` to `.html` mapping the upload used, and without
//! case, since the library resolves `Docs/a.txt` and `docs/a.txt` to the
//! same item.

use std::collections::{HashMap, HashSet};

use spsync_core::domain::paths::{md_to_html_target, path_key, sanitize_path_components};
use spsync_core::domain::{Counter, LocalFile, RemoteFileRecord, SyncStatistics};
use spsync_core::ports::IRemoteLibrary;
use tracing::{error, info};

/// Remote relative paths the local files were uploaded to.
pub fn local_relpaths(files: &[LocalFile], convert_md: bool) -> HashSet<String> {
    files
        .iter()
        .map(|f| {
            let target = sanitize_path_components(&f.relative_path);
            if convert_md {
                md_to_html_target(&target)
            } else {
                target
            }
        })
        .collect()
}

/// Remote paths absent from `local`, sorted.
pub fn find_orphans<'a>(
    local: &HashSet<String>,
    remote_files: &'a HashMap<String, RemoteFileRecord>,
) -> Vec<(&'a String, &'a RemoteFileRecord)> {
    let local: HashSet<String> = local.iter().map(|p| path_key(p)).collect();
    let mut orphans: Vec<_> = remote_files
        .iter()
        .filter(|(path, _)| !local.contains(&path_key(path)))
        .collect();
    orphans.sort_by(|a, b| a.0.cmp(b.0));
    orphans
}

/// Delete (or with `whatif`, only report) every orphan.
///
/// Returns the number of orphans deleted, or that would be deleted. A
/// failed delete counts `failed_files` and the rest still run.
pub async fn reconcile(
    remote: &dyn IRemoteLibrary,
    local: &HashSet<String>,
    remote_files: &HashMap<String, RemoteFileRecord>,
    whatif: bool,
    stats: &SyncStatistics,
) -> usize {
    let orphans = find_orphans(local, remote_files);
    if orphans.is_empty() {
        info!("No orphaned remote files");
        return 0;
    }
    info!(count = orphans.len(), whatif, "Orphaned remote files found");

    let mut deleted = 0;
    for (path, record) in orphans {
        if whatif {
            info!(path = %path, "Would delete (preview)");
            stats.incr(Counter::DeletedFiles);
            deleted += 1;
            continue;
        }
        match remote.delete_item(&record.item_id).await {
            Ok(()) => {
                info!(path = %path, "Deleted orphaned file");
                stats.incr(Counter::DeletedFiles);
                deleted += 1;
            }
            Err(e) => {
                error!(path = %path, error = %format!("{e:#}"), "Failed to delete orphaned file");
                stats.incr(Counter::FailedFiles);
            }
        }
    }
    deleted
}
