//! Upload decisions against snapshot entries and point queries

use std::sync::Arc;

use spsync_core::domain::{
    Fingerprint, LocalFile, RemoteSnapshot, SkipReason, SyncStatistics, UploadReason,
};
use spsync_core::ports::IRemoteLibrary;
use spsync_sync::decision::{Action, DecisionEngine};

use crate::common::{self, FakeLibrary, ROOT_ID};

fn engine(fake: &Arc<FakeLibrary>, snapshot: RemoteSnapshot) -> (DecisionEngine, Arc<SyncStatistics>) {
    let stats = Arc::new(SyncStatistics::new());
    let remote: Arc<dyn IRemoteLibrary> = fake.clone();
    (DecisionEngine::new(remote, Arc::new(snapshot), stats.clone()), stats)
}

#[tokio::test]
async fn test_matching_fingerprint_skips_without_remote_calls() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("docs/a.txt", b"hello", Some(Fingerprint::of_bytes(b"hello")));
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("docs/a.txt", "hello")]);
    let decision = engine.decide(&local[0], "docs/a.txt", None, None, false).await;

    assert_eq!(decision.action, Action::Skip(SkipReason::HashMatch));
    assert!(!decision.should_upload());
    let s = stats.snapshot();
    assert_eq!(s.cache_hits, 1);
    assert_eq!(s.compared_by_hash, 1);
    assert_eq!(s.hash_matched, 1);
    assert_eq!(s.bytes_skipped, 5);
    assert_eq!(FakeLibrary::count(&fake.get_child_calls), 0);
}

#[tokio::test]
async fn test_different_fingerprint_uploads_as_changed() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("a.txt", b"hello", Some(Fingerprint::of_bytes(b"hello")));
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("a.txt", "HELLO")]);
    let decision = engine.decide(&local[0], "a.txt", Some(ROOT_ID), None, false).await;

    assert_eq!(decision.action, Action::Upload(UploadReason::Changed));
    assert!(decision.is_update());
    assert_eq!(decision.fingerprint, Some(Fingerprint::of_bytes(b"HELLO")));
    assert!(decision.existing.is_some());
    assert_eq!(stats.snapshot().compared_by_hash, 1);
    assert_eq!(stats.snapshot().hash_matched, 0);
}

#[tokio::test]
async fn test_empty_remote_hash_falls_back_to_size_and_backfills() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("a.txt", b"hello", None);
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("a.txt", "world")]);
    let decision = engine.decide(&local[0], "a.txt", Some(ROOT_ID), None, false).await;

    assert_eq!(decision.action, Action::Skip(SkipReason::SizeMatch));
    let s = stats.snapshot();
    assert_eq!(s.hash_empty_found, 1);
    assert_eq!(s.compared_by_size, 1);
    assert_eq!(s.hash_backfilled, 1);
    assert_eq!(
        fake.item_at("a.txt").unwrap().fingerprint,
        Some(Fingerprint::of_bytes(b"world"))
    );
}

#[tokio::test]
async fn test_size_mismatch_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("a.txt", b"hello", None);
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("a.txt", "hello, world")]);
    let decision = engine.decide(&local[0], "a.txt", Some(ROOT_ID), None, false).await;

    assert_eq!(decision.action, Action::Upload(UploadReason::Changed));
    assert_eq!(stats.snapshot().hash_backfilled, 0);
    assert_eq!(FakeLibrary::count(&fake.update_calls), 0);
}

#[tokio::test]
async fn test_missing_hash_column_compares_size_only() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::without_hash_column());
    fake.add_file("a.txt", b"hello", None);
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("a.txt", "hello")]);
    let decision = engine.decide(&local[0], "a.txt", Some(ROOT_ID), None, false).await;

    assert_eq!(decision.action, Action::Skip(SkipReason::SizeMatch));
    assert_eq!(decision.fingerprint, None);
    let s = stats.snapshot();
    assert_eq!(s.hash_column_unavailable, 1);
    assert_eq!(s.hash_empty_found, 0);
    assert_eq!(FakeLibrary::count(&fake.update_calls), 0);
}

#[tokio::test]
async fn test_cache_miss_then_absent_is_new() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("new.txt", "fresh")]);
    let decision = engine.decide(&local[0], "new.txt", Some(ROOT_ID), None, false).await;

    assert_eq!(decision.action, Action::Upload(UploadReason::New));
    assert!(!decision.is_update());
    let s = stats.snapshot();
    assert_eq!(s.cache_misses, 1);
    assert_eq!(s.api_queries, 1);
}

#[tokio::test]
async fn test_unavailable_snapshot_uses_point_query() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("a.txt", b"same", Some(Fingerprint::of_bytes(b"same")));
    let (engine, stats) = engine(&fake, RemoteSnapshot::unavailable());

    let local = common::write_local(dir.path(), &[("a.txt", "same")]);
    let decision = engine.decide(&local[0], "a.txt", Some(ROOT_ID), None, false).await;

    assert_eq!(decision.action, Action::Skip(SkipReason::HashMatch));
    let s = stats.snapshot();
    assert_eq!(s.cache_hits, 0);
    assert_eq!(s.cache_misses, 0);
    assert_eq!(s.api_queries, 1);
    assert_eq!(FakeLibrary::count(&fake.get_child_calls), 1);
}

#[tokio::test]
async fn test_unknown_parent_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    let (engine, _) = engine(&fake, RemoteSnapshot::unavailable());

    let local = common::write_local(dir.path(), &[("x/a.txt", "data")]);
    let decision = engine.decide(&local[0], "x/a.txt", None, None, false).await;

    assert_eq!(decision.action, Action::Upload(UploadReason::Unknown));
    assert!(!decision.is_update());
    assert_eq!(FakeLibrary::count(&fake.get_child_calls), 0);
}

#[tokio::test]
async fn test_point_query_error_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("a.txt", b"same", Some(Fingerprint::of_bytes(b"same")));
    fake.fail_get_child.store(true, std::sync::atomic::Ordering::SeqCst);
    let (engine, _) = engine(&fake, RemoteSnapshot::unavailable());

    let local = common::write_local(dir.path(), &[("a.txt", "same")]);
    let decision = engine.decide(&local[0], "a.txt", Some(ROOT_ID), None, false).await;

    assert_eq!(decision.action, Action::Upload(UploadReason::Unknown));
    assert!(!decision.is_update());
    assert!(decision.existing.is_none());
}

#[tokio::test]
async fn test_unreadable_file_still_reports_existence() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("old.txt", b"data", Some(Fingerprint::of_bytes(b"data")));
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let unreadable = |name: &str| LocalFile {
        absolute_path: dir.path().join("missing").join(name),
        size: 4,
        modified: None,
        relative_path: name.to_string(),
    };
    let existing = engine
        .decide(&unreadable("old.txt"), "old.txt", Some(ROOT_ID), None, false)
        .await;
    let absent = engine
        .decide(&unreadable("new.txt"), "new.txt", Some(ROOT_ID), None, false)
        .await;

    assert_eq!(existing.action, Action::Upload(UploadReason::Changed));
    assert!(existing.is_update());
    assert_eq!(existing.fingerprint, None);
    assert_eq!(absent.action, Action::Upload(UploadReason::New));
    assert!(!absent.is_update());
    assert_eq!(stats.snapshot().compared_by_hash, 0);
}

#[tokio::test]
async fn test_snapshot_lookup_ignores_case() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("docs/a.txt", b"alpha", Some(Fingerprint::of_bytes(b"alpha")));
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("Docs/a.txt", "alpha")]);
    let decision = engine.decide(&local[0], "Docs/a.txt", None, None, false).await;

    assert_eq!(decision.action, Action::Skip(SkipReason::HashMatch));
    assert_eq!(stats.snapshot().cache_hits, 1);
    assert_eq!(FakeLibrary::count(&fake.get_child_calls), 0);
}

#[tokio::test]
async fn test_force_uploads_and_reports_existence() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    fake.add_file("a.txt", b"same", Some(Fingerprint::of_bytes(b"same")));
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, stats) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("a.txt", "same"), ("b.txt", "other")]);
    let existing = engine.decide(&local[0], "a.txt", Some(ROOT_ID), None, true).await;
    let absent = engine.decide(&local[1], "b.txt", Some(ROOT_ID), None, true).await;

    assert_eq!(existing.action, Action::Upload(UploadReason::Changed));
    assert_eq!(existing.fingerprint, Some(Fingerprint::of_bytes(b"same")));
    assert_eq!(absent.action, Action::Upload(UploadReason::New));
    assert_eq!(stats.snapshot().skipped_files, 0);
    assert_eq!(stats.snapshot().hash_matched, 0);
}

#[tokio::test]
async fn test_precomputed_fingerprint_replaces_local_digest() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeLibrary::new());
    let source = Fingerprint::of_bytes(b"# Title\n");
    fake.add_file("readme.html", b"<html>rendered</html>", Some(source.clone()));
    let snapshot = common::snapshot_of(&fake).await;
    let (engine, _) = engine(&fake, snapshot);

    let local = common::write_local(dir.path(), &[("readme.md", "# Title\n")]);
    let decision = engine
        .decide(&local[0], "readme.html", Some(ROOT_ID), Some(source), false)
        .await;

    assert_eq!(decision.action, Action::Skip(SkipReason::HashMatch));
}
