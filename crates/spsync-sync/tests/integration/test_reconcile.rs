//! Orphan detection and deletion in mirror mode

use std::collections::HashSet;
use std::sync::Arc;

use spsync_core::domain::SyncStatistics;
use spsync_sync::reconcile::{local_relpaths, reconcile};

use crate::common::{self, FakeLibrary};

async fn seeded() -> (Arc<FakeLibrary>, spsync_core::domain::RemoteSnapshot) {
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("a.html", b"<html/>", None);
    fake.add_file("b.txt", b"b", None);
    fake.add_file("c.txt", b"c", None);
    let snapshot = common::snapshot_of(&fake).await;
    (fake, snapshot)
}

fn local_set(paths: &[&str]) -> HashSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn test_whatif_reports_without_deleting() {
    let (fake, snapshot) = seeded().await;
    let stats = SyncStatistics::new();

    let count = reconcile(
        fake.as_ref(),
        &local_set(&["a.html", "b.txt"]),
        &snapshot.files,
        true,
        &stats,
    )
    .await;

    assert_eq!(count, 1);
    assert_eq!(stats.snapshot().deleted_files, 1);
    assert!(fake.item_at("c.txt").is_some());
    assert_eq!(FakeLibrary::count(&fake.delete_calls), 0);
}

#[tokio::test]
async fn test_live_run_deletes_orphans() {
    let (fake, snapshot) = seeded().await;
    let stats = SyncStatistics::new();

    let count = reconcile(
        fake.as_ref(),
        &local_set(&["a.html", "b.txt"]),
        &snapshot.files,
        false,
        &stats,
    )
    .await;

    assert_eq!(count, 1);
    assert!(fake.item_at("c.txt").is_none());
    assert!(fake.item_at("a.html").is_some());
    assert!(fake.item_at("b.txt").is_some());
}

#[tokio::test]
async fn test_converted_markdown_is_not_an_orphan() {
    let (fake, snapshot) = seeded().await;
    let stats = SyncStatistics::new();
    let dir = tempfile::tempdir().unwrap();
    let files = common::write_local(dir.path(), &[("a.md", "# A"), ("b.txt", "b"), ("c.txt", "c")]);

    let count = reconcile(
        fake.as_ref(),
        &local_relpaths(&files, true),
        &snapshot.files,
        false,
        &stats,
    )
    .await;

    assert_eq!(count, 0);
    assert_eq!(fake.file_count(), 3);
}

#[tokio::test]
async fn test_failed_delete_does_not_stop_the_rest() {
    let (fake, snapshot) = seeded().await;
    let stats = SyncStatistics::new();
    let b_id = fake.item_at("b.txt").unwrap().id;
    fake.failing_deletes.lock().unwrap().insert(b_id);

    let count = reconcile(fake.as_ref(), &local_set(&["a.html"]), &snapshot.files, false, &stats).await;

    assert_eq!(count, 1);
    let s = stats.snapshot();
    assert_eq!(s.deleted_files, 1);
    assert_eq!(s.failed_files, 1);
    assert!(fake.item_at("b.txt").is_some());
    assert!(fake.item_at("c.txt").is_none());
}
