mod common;

use std::sync::Arc;

use bucket_navigator::error::AppError;
use bucket_navigator::mutator::FolderMutator;
use bucket_navigator::sync::ViewSynchronizer;
use bucket_navigator::tree::fetch_tree;
use common::{MockStore, Op};

const BUCKET: &str = "media";

fn setup() -> (MockStore, Arc<ViewSynchronizer>, FolderMutator) {
    let store = MockStore::new().with_bucket(BUCKET);
    let sync = Arc::new(ViewSynchronizer::new());
    let mutator = FolderMutator::new(Arc::new(store.clone()), sync.clone());
    (store, sync, mutator)
}

fn seed(store: &MockStore) {
    for key in [
        "photos/",
        "photos/a.jpg",
        "photos/2024/b.jpg",
        "photos/2024/c.jpg",
        "photoshop/keep.psd",
        "docs/readme.md",
    ] {
        store.insert(BUCKET, key, key.as_bytes());
    }
}

#[tokio::test]
async fn test_create_folder_writes_marker_and_shows_in_tree() {
    let (store, sync, mutator) = setup();

    let key = mutator.create_child_folder(BUCKET, "", "new").await.unwrap();
    assert_eq!(key, "new/");
    assert_eq!(store.data(BUCKET, "new/").unwrap(), Vec::<u8>::new());
    assert_eq!(sync.epoch(), 1);

    // Creating it again is not an error
    mutator.create_folder(BUCKET, "new").await.unwrap();

    let nested = mutator.create_child_folder(BUCKET, "new", "inner").await.unwrap();
    assert_eq!(nested, "new/inner/");

    let tree = fetch_tree(&store, BUCKET).await.unwrap();
    assert!(tree.find("new/inner").is_some());
}

#[tokio::test]
async fn test_create_folder_rejects_bad_names_before_backend() {
    let (store, sync, mutator) = setup();

    for name in ["", "a/b", "a\\b"] {
        let err = mutator.create_child_folder(BUCKET, "", name).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
    for path in ["a//b", "/a/ /b", "a/b\\c"] {
        let err = mutator.create_folder(BUCKET, path).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{}", path);
    }
    assert!(store.keys(BUCKET).is_empty());
    assert_eq!(sync.epoch(), 0);
}

#[tokio::test]
async fn test_delete_folder_removes_everything_under_prefix() {
    let (store, sync, mutator) = setup();
    seed(&store);

    let result = mutator.delete_folder(BUCKET, "photos").await.unwrap();
    assert_eq!(result.deleted, 4);
    assert!(result.errors.is_empty());

    let keys = store.keys(BUCKET);
    assert!(keys.iter().all(|k| !k.starts_with("photos/")));
    // Sibling sharing the textual prefix survives
    assert!(keys.contains(&"photoshop/keep.psd".to_string()));
    assert_eq!(sync.epoch(), 1);
}

#[tokio::test]
async fn test_delete_root_is_rejected() {
    let (store, _sync, mutator) = setup();
    seed(&store);
    let err = mutator.delete_folder(BUCKET, "").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(store.keys(BUCKET).len(), 6);
}

#[tokio::test]
async fn test_rename_moves_every_key() {
    let (store, sync, mutator) = setup();
    seed(&store);

    let report = mutator.rename_folder(BUCKET, "photos", "pictures").await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.new_path, "pictures");
    assert_eq!(report.moved.len(), 4);

    let keys = store.keys(BUCKET);
    assert!(keys.iter().all(|k| !k.starts_with("photos/")));
    for relative in ["", "a.jpg", "2024/b.jpg", "2024/c.jpg"] {
        assert!(keys.contains(&format!("pictures/{}", relative)));
    }
    assert_eq!(
        store.data(BUCKET, "pictures/2024/b.jpg").unwrap(),
        b"photos/2024/b.jpg".to_vec()
    );
    assert!(keys.contains(&"photoshop/keep.psd".to_string()));
    assert_eq!(sync.epoch(), 1);
}

#[tokio::test]
async fn test_rename_nested_folder_stays_in_parent() {
    let (store, _sync, mutator) = setup();
    seed(&store);

    mutator.rename_folder(BUCKET, "photos/2024", "archive").await.unwrap();

    let keys = store.keys(BUCKET);
    assert!(keys.contains(&"photos/archive/b.jpg".to_string()));
    assert!(keys.contains(&"photos/a.jpg".to_string()));
}

#[tokio::test]
async fn test_partial_rename_reports_each_failure() {
    let (store, sync, mutator) = setup();
    seed(&store);
    store.fail_on(Op::Copy, "photos/2024/b.jpg");

    let report = mutator.rename_folder(BUCKET, "photos", "pictures").await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "photos/2024/b.jpg");
    assert_eq!(report.moved.len(), 3);
    // Partial success still triggers a refresh
    assert_eq!(sync.epoch(), 1);

    let keys = store.keys(BUCKET);
    assert!(keys.contains(&"photos/2024/b.jpg".to_string()));
    assert!(keys.contains(&"pictures/2024/c.jpg".to_string()));

    // Rerunning the rename picks up what was left behind
    store.clear_failures();
    let retry = mutator.rename_folder(BUCKET, "photos", "pictures").await.unwrap();
    assert!(retry.is_complete());
    assert_eq!(retry.moved.len(), 1);
    assert!(store.keys(BUCKET).iter().all(|k| !k.starts_with("photos/")));
}

#[tokio::test]
async fn test_failed_delete_after_copy_keeps_both_keys() {
    let (store, _sync, mutator) = setup();
    seed(&store);
    store.fail_on(Op::Delete, "photos/a.jpg");

    let report = mutator.rename_folder(BUCKET, "photos", "pictures").await.unwrap();
    assert_eq!(report.failed.len(), 1);

    let keys = store.keys(BUCKET);
    assert!(keys.contains(&"photos/a.jpg".to_string()));
    assert!(keys.contains(&"pictures/a.jpg".to_string()));
}

#[tokio::test]
async fn test_rename_validation() {
    let (store, sync, mutator) = setup();
    seed(&store);

    let cases = [("", "x"), ("photos", ""), ("photos", "a/b"), ("photos", "photos")];
    for (path, name) in cases {
        let err = mutator.rename_folder(BUCKET, path, name).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{} -> {}", path, name);
    }
    // Rejected without touching the backend
    assert_eq!(store.full_listings(), 0);
    assert_eq!(sync.epoch(), 0);
}

#[tokio::test]
async fn test_rename_missing_folder_is_backend_not_found() {
    let (store, sync, mutator) = setup();
    seed(&store);

    let err = mutator.rename_folder(BUCKET, "missing", "x").await.unwrap_err();
    assert!(matches!(err, AppError::Backend(_)));
    assert_eq!(store.keys(BUCKET).len(), 6);
    assert_eq!(sync.epoch(), 0);
}

#[tokio::test]
async fn test_rename_lists_only_the_folder_prefix() {
    let (store, _sync, mutator) = setup();
    seed(&store);

    let report = mutator.rename_folder(BUCKET, "docs", "manuals").await.unwrap();
    assert_eq!(report.moved.len(), 1);
    assert_eq!(store.full_listings(), 0);
}
