mod common;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bucket_navigator::sync::ViewSynchronizer;
use bucket_navigator::transfer::{
    TransferCoordinator, TransferEvent, TransferKind, TransferOptions,
};
use common::{MockStore, Op};
use tempfile::TempDir;
use tokio::sync::broadcast;

const BUCKET: &str = "uploads";

fn setup() -> (MockStore, Arc<ViewSynchronizer>, TransferCoordinator) {
    let store = MockStore::new().with_bucket(BUCKET);
    let sync = Arc::new(ViewSynchronizer::new());
    let coordinator =
        TransferCoordinator::new(Arc::new(store.clone()), sync.clone(), TransferOptions::default());
    (store, sync, coordinator)
}

fn write_files(dir: &TempDir, files: &[(&str, &[u8])]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, data)| {
            let path = dir.path().join(name);
            std::fs::write(&path, data).unwrap();
            path
        })
        .collect()
}

fn drain(rx: &mut broadcast::Receiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_upload_batch_is_fail_independent() {
    let (store, sync, coordinator) = setup();
    let dir = TempDir::new().unwrap();
    let sources = write_files(
        &dir,
        &[("1.txt", b"one"), ("2.txt", b"two"), ("3.txt", b"three")],
    );
    store.fail_on(Op::Put, "inbox/2.txt");
    let mut rx = coordinator.subscribe();

    let report = coordinator.bulk_upload(BUCKET, "inbox", sources).await;

    let mut succeeded = report.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec!["1.txt", "3.txt"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "2.txt");

    assert_eq!(store.data(BUCKET, "inbox/3.txt").unwrap(), b"three".to_vec());
    assert!(store.data(BUCKET, "inbox/2.txt").is_none());

    // One completion event and one refresh for the whole batch
    let events = drain(&mut rx);
    let completions: Vec<&TransferEvent> = events
        .iter()
        .filter(|e| matches!(e, TransferEvent::BatchCompleted { .. }))
        .collect();
    assert_eq!(completions.len(), 1);
    match completions[0] {
        TransferEvent::BatchCompleted { report: emitted } => assert_eq!(emitted, &report),
        _ => unreachable!(),
    }
    assert_eq!(sync.epoch(), 1);

    // Tasks are gone once the report is out
    assert!(coordinator.active_tasks().is_empty());
}

#[tokio::test]
async fn test_upload_progress_is_monotonic_and_ends_at_100() {
    let (_store, _sync, coordinator) = setup();
    let dir = TempDir::new().unwrap();
    let sources = write_files(
        &dir,
        &[("big.bin", &[7u8; 37]), ("small.bin", &[1u8; 3]), ("empty.bin", b"")],
    );
    let mut rx = coordinator.subscribe();

    let report = coordinator.bulk_upload(BUCKET, "", sources).await;
    assert!(report.all_succeeded());

    let mut per_item: HashMap<String, Vec<u8>> = HashMap::new();
    for event in drain(&mut rx) {
        if let TransferEvent::Progress { item, percent, kind, .. } = event {
            assert_eq!(kind, TransferKind::Upload);
            per_item.entry(item).or_default().push(percent);
        }
    }

    assert_eq!(per_item.len(), 3);
    for (item, percents) in &per_item {
        assert!(
            percents.windows(2).all(|w| w[0] < w[1]),
            "{} went backwards: {:?}",
            item,
            percents
        );
        assert_eq!(percents.last(), Some(&100), "{} did not finish", item);
    }
    // 37 bytes in 4-byte chunks: 4/37 rounds to 11
    assert_eq!(per_item["big.bin"][0], 11);
}

#[tokio::test]
async fn test_failed_item_has_no_final_100() {
    let (store, _sync, coordinator) = setup();
    let dir = TempDir::new().unwrap();
    let sources = write_files(&dir, &[("bad.bin", &[0u8; 16])]);
    store.fail_on(Op::Put, "bad.bin");
    let mut rx = coordinator.subscribe();

    let report = coordinator.bulk_upload(BUCKET, "", sources).await;
    assert_eq!(report.failed.len(), 1);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .all(|e| !matches!(e, TransferEvent::Progress { percent: 100, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, TransferEvent::Failed { item, .. } if item == "bad.bin")));
}

#[tokio::test]
async fn test_download_writes_files_by_base_name() {
    let (store, sync, coordinator) = setup();
    store.insert(BUCKET, "reports/q1.csv", b"a,b\n1,2\n");
    store.insert(BUCKET, "reports/q2.csv", b"a,b\n3,4\n");
    store.fail_on(Op::Get, "reports/q2.csv");
    let dir = TempDir::new().unwrap();
    let mut rx = coordinator.subscribe();

    let report = coordinator
        .bulk_download(
            BUCKET,
            vec!["reports/q1.csv".into(), "reports/q2.csv".into()],
            dir.path(),
        )
        .await;

    assert_eq!(report.succeeded, vec!["reports/q1.csv"]);
    assert_eq!(report.failed[0].item, "reports/q2.csv");
    assert_eq!(
        std::fs::read(dir.path().join("q1.csv")).unwrap(),
        b"a,b\n1,2\n".to_vec()
    );

    let events = drain(&mut rx);
    let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
    assert!(names.contains(&"download-progress"));
    assert!(names.contains(&"bulk-download-complete"));
    // Downloads do not change the object set
    assert_eq!(sync.epoch(), 0);
}

#[tokio::test]
async fn test_download_keeps_same_named_keys_apart() {
    let (store, _sync, coordinator) = setup();
    store.insert(BUCKET, "a/x.txt", &[b'A'; 20]);
    store.insert(BUCKET, "b/x.txt", b"BB");
    let dir = TempDir::new().unwrap();

    let report = coordinator
        .bulk_download(BUCKET, vec!["a/x.txt".into(), "b/x.txt".into()], dir.path())
        .await;
    assert!(report.all_succeeded());

    let mut files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    files.sort();
    assert_eq!(files, vec!["x (1).txt", "x.txt"]);
    // Keys are named in request order
    assert_eq!(std::fs::read(dir.path().join("x.txt")).unwrap(), vec![b'A'; 20]);
    assert_eq!(std::fs::read(dir.path().join("x (1).txt")).unwrap(), b"BB".to_vec());
}

#[tokio::test]
async fn test_bulk_delete_files_and_folders() {
    let (store, sync, coordinator) = setup();
    for key in ["a.txt", "b.txt", "dir/", "dir/x.txt", "dir/y/z.txt", "keep.txt"] {
        store.insert(BUCKET, key, b"x");
    }
    store.fail_on(Op::Delete, "b.txt");

    let report = coordinator
        .bulk_delete(BUCKET, vec!["a.txt".into(), "b.txt".into(), "dir/".into()])
        .await;

    let mut succeeded = report.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec!["a.txt", "dir/"]);
    assert_eq!(report.failed[0].item, "b.txt");
    assert_eq!(store.keys(BUCKET), vec!["b.txt", "keep.txt"]);
    assert_eq!(sync.epoch(), 1);
}
