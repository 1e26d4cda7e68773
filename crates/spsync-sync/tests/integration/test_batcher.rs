//! Phased FileHash writes: batching, re-query, and final accounting

use std::sync::atomic::Ordering;
use std::sync::Arc;

use spsync_core::domain::{Fingerprint, PendingMetadataWrite, SyncStatistics};
use spsync_core::ports::IRemoteLibrary;
use spsync_sync::batcher::{FlushReport, FlushSchedule, MetadataWriteBatcher};

use crate::common::{FakeLibrary, ROOT_ID};

fn batcher(fake: &Arc<FakeLibrary>) -> MetadataWriteBatcher {
    let remote: Arc<dyn IRemoteLibrary> = fake.clone();
    MetadataWriteBatcher::with_schedule(remote, FlushSchedule::immediate())
}

/// Place `name` remotely and describe the write its upload would queue.
fn pending(fake: &FakeLibrary, name: &str, is_update: bool) -> PendingMetadataWrite {
    let item = fake.add_file(name, name.as_bytes(), None);
    PendingMetadataWrite {
        parent_id: ROOT_ID.to_string(),
        filename: name.to_string(),
        list_item_id: item.list_item_id,
        fingerprint: Fingerprint::of_bytes(name.as_bytes()),
        is_update,
        display_path: name.to_string(),
    }
}

#[tokio::test]
async fn test_empty_queue_makes_no_requests() {
    let fake = Arc::new(FakeLibrary::new());
    let stats = SyncStatistics::new();

    let report = batcher(&fake).flush(&stats).await;

    assert_eq!(report, FlushReport::default());
    assert_eq!(FakeLibrary::count(&fake.batch_calls), 0);
}

#[tokio::test]
async fn test_twenty_five_writes_with_late_failures() {
    let fake = Arc::new(FakeLibrary::new());
    let stats = SyncStatistics::new();
    let batcher = batcher(&fake);

    let writes: Vec<_> = (1..=25)
        .map(|i| pending(&fake, &format!("file{i:02}.txt"), false))
        .collect();
    {
        let mut failing = fake.failing_writes.lock().unwrap();
        for (index, write) in writes.iter().enumerate().skip(20) {
            let id = write.list_item_id.clone().unwrap();
            // Entries 21-23 recover on retry; 24 and 25 never do.
            let failures = if index < 23 { 1 } else { usize::MAX };
            failing.insert(id, failures);
        }
    }
    for write in writes {
        batcher.enqueue(write);
    }
    assert_eq!(batcher.pending(), 25);

    let report = batcher.flush(&stats).await;

    assert_eq!(report, FlushReport { succeeded: 23, failed: 2 });
    let s = stats.snapshot();
    assert_eq!(s.hash_new_saved, 23);
    assert_eq!(s.hash_save_failed, 2);
    assert_eq!(s.hash_new_saved + s.hash_updated + s.hash_save_failed, 25);
    // initial: 20 + 5, retry: 5, final: 2
    assert_eq!(FakeLibrary::count(&fake.batch_calls), 4);
    assert_eq!(FakeLibrary::count(&fake.get_child_calls), 7);
    assert_eq!(batcher.pending(), 0);

    assert_eq!(
        fake.item_at("file23.txt").unwrap().fingerprint,
        Some(Fingerprint::of_bytes(b"file23.txt"))
    );
    assert_eq!(fake.item_at("file25.txt").unwrap().fingerprint, None);
}

#[tokio::test]
async fn test_missing_list_item_id_is_requeried() {
    let fake = Arc::new(FakeLibrary::new());
    let stats = SyncStatistics::new();
    let batcher = batcher(&fake);

    let mut write = pending(&fake, "report.pdf", false);
    write.list_item_id = None;
    batcher.enqueue(write);

    let report = batcher.flush(&stats).await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(FakeLibrary::count(&fake.get_child_calls), 1);
    assert_eq!(FakeLibrary::count(&fake.batch_calls), 1);
    assert!(fake.item_at("report.pdf").unwrap().fingerprint.is_some());
}

#[tokio::test]
async fn test_vanished_item_fails_once() {
    let fake = Arc::new(FakeLibrary::new());
    let stats = SyncStatistics::new();
    let batcher = batcher(&fake);

    batcher.enqueue(PendingMetadataWrite {
        parent_id: ROOT_ID.to_string(),
        filename: "gone.txt".to_string(),
        list_item_id: None,
        fingerprint: Fingerprint::of_bytes(b"gone"),
        is_update: false,
        display_path: "gone.txt".to_string(),
    });

    let report = batcher.flush(&stats).await;

    assert_eq!(report, FlushReport { succeeded: 0, failed: 1 });
    assert_eq!(stats.snapshot().hash_save_failed, 1);
    assert_eq!(FakeLibrary::count(&fake.batch_calls), 0);
}

#[tokio::test]
async fn test_failed_batch_request_is_retried() {
    let fake = Arc::new(FakeLibrary::new());
    let stats = SyncStatistics::new();
    let batcher = batcher(&fake);
    for name in ["a.txt", "b.txt", "c.txt"] {
        batcher.enqueue(pending(&fake, name, false));
    }
    fake.failing_batches.store(1, Ordering::SeqCst);

    let report = batcher.flush(&stats).await;

    assert_eq!(report, FlushReport { succeeded: 3, failed: 0 });
    assert_eq!(FakeLibrary::count(&fake.batch_calls), 2);
}

#[tokio::test]
async fn test_updates_and_new_files_are_counted_apart() {
    let fake = Arc::new(FakeLibrary::new());
    let stats = SyncStatistics::new();
    let batcher = batcher(&fake);
    batcher.enqueue(pending(&fake, "new.txt", false));
    batcher.enqueue(pending(&fake, "changed.txt", true));
    batcher.enqueue(pending(&fake, "changed2.txt", true));

    batcher.flush(&stats).await;

    let s = stats.snapshot();
    assert_eq!(s.hash_new_saved, 1);
    assert_eq!(s.hash_updated, 2);
}

#[tokio::test(start_paused = true)]
async fn test_standard_schedule_waits_before_retry() {
    let fake = Arc::new(FakeLibrary::new());
    let stats = SyncStatistics::new();
    let remote: Arc<dyn IRemoteLibrary> = fake.clone();
    let batcher = MetadataWriteBatcher::new(remote);
    batcher.enqueue(pending(&fake, "a.txt", false));
    fake.failing_batches.store(1, Ordering::SeqCst);

    let start = tokio::time::Instant::now();
    let report = batcher.flush(&stats).await;

    assert_eq!(report.succeeded, 1);
    // no initial wait for plain files, 8s before the retry phase
    assert_eq!(start.elapsed().as_secs(), 8);
}
