//! Remote snapshot construction

use std::sync::atomic::Ordering;

use spsync_core::domain::Fingerprint;
use spsync_sync::cache::build_snapshot;

use crate::common::{FakeLibrary, ROOT_ID};

#[tokio::test]
async fn test_snapshot_keys_nested_paths() {
    let fake = FakeLibrary::new();
    fake.add_file("top.txt", b"top", Some(Fingerprint::of_bytes(b"top")));
    fake.add_file("docs/guide.html", b"<html/>", None);
    fake.add_file("docs/deep/er/notes.md", b"# n", None);
    fake.add_folder("empty");

    let snapshot = build_snapshot(&fake, ROOT_ID).await;

    assert!(snapshot.available);
    assert_eq!(snapshot.files.len(), 3);
    assert_eq!(
        snapshot.file("top.txt").unwrap().fingerprint,
        Some(Fingerprint::of_bytes(b"top"))
    );
    assert_eq!(snapshot.file("docs/guide.html").unwrap().size, Some(7));
    assert!(snapshot.file("docs/deep/er/notes.md").is_some());
    for folder in ["docs", "docs/deep", "docs/deep/er", "empty"] {
        assert!(snapshot.folder(folder).is_some(), "missing folder {folder}");
    }
    // one listing per folder, root included
    assert_eq!(FakeLibrary::count(&fake.list_calls), 5);
}

#[tokio::test]
async fn test_listing_failure_degrades_to_unavailable() {
    let fake = FakeLibrary::new();
    fake.add_file("a.txt", b"a", None);
    fake.fail_listing.store(true, Ordering::SeqCst);

    let snapshot = build_snapshot(&fake, ROOT_ID).await;

    assert!(!snapshot.available);
    assert!(snapshot.files.is_empty());
}
