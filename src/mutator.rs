//! Create, rename and delete synthetic folders as object-key operations.
//!
//! Rename is best-effort: every matched key is moved independently and the
//! outcome of each is reported. Running the same rename again picks up only the
//! keys still under the old prefix, so a rerun is the retry path.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::error::{AppError, FailedItem, Result};
use crate::s3::gateway::{ByteSource, DeleteResult, ObjectStore};
use crate::sync::{MutationKind, ViewSynchronizer};
use crate::transfer::DEFAULT_MAX_CONCURRENT;
use crate::tree::{join_path, parent_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMove {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameReport {
    pub old_path: String,
    pub new_path: String,
    pub moved: Vec<KeyMove>,
    pub failed: Vec<FailedItem>,
}

impl RenameReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_result(self) -> Result<RenameReport> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(AppError::PartialBatch(self.failed))
        }
    }
}

/// Strip surrounding slashes so `"a/b/"` and `"a/b"` name the same folder.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Folder names are single path segments.
pub fn validate_folder_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Folder name cannot be empty".into()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(AppError::Validation(
            "Folder name cannot contain slashes".into(),
        ));
    }
    Ok(())
}

/// Every segment of a normalized path must be a valid folder name, so
/// `a//b` is rejected rather than written as the key `a//b/`.
pub fn validate_folder_path(path: &str) -> Result<()> {
    path.split('/').try_for_each(validate_folder_name)
}

/// Key `key` (under `old_path/`) rewritten to live under `new_path/`.
pub fn renamed_key(key: &str, old_path: &str, new_path: &str) -> String {
    format!("{}{}", new_path, &key[old_path.len()..])
}

pub struct FolderMutator {
    store: Arc<dyn ObjectStore>,
    sync: Arc<ViewSynchronizer>,
    max_concurrent: usize,
}

impl FolderMutator {
    pub fn new(store: Arc<dyn ObjectStore>, sync: Arc<ViewSynchronizer>) -> Self {
        Self {
            store,
            sync,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Write the empty marker object `path/`. Creating an existing folder
    /// overwrites its marker and succeeds.
    pub async fn create_folder(&self, bucket: &str, path: &str) -> Result<String> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(AppError::Validation("Folder path cannot be empty".into()));
        }
        validate_folder_path(path)?;

        let key = format!("{}/", path);
        self.store
            .put_object_bytes(bucket, &key, ByteSource::Memory(Vec::new()), None, None)
            .await?;

        log::info!("Created folder marker {} in {}", key, bucket);
        self.sync.on_mutation(MutationKind::CreateFolder);
        Ok(key)
    }

    /// Create `name` under `parent`.
    pub async fn create_child_folder(&self, bucket: &str, parent: &str, name: &str) -> Result<String> {
        validate_folder_name(name)?;
        self.create_folder(bucket, &join_path(normalize_path(parent), name))
            .await
    }

    /// Move every key under `old_path/` to the sibling folder `new_name`.
    pub async fn rename_folder(
        &self,
        bucket: &str,
        old_path: &str,
        new_name: &str,
    ) -> Result<RenameReport> {
        let old_path = normalize_path(old_path);
        if old_path.is_empty() {
            return Err(AppError::Validation("Cannot rename the bucket root".into()));
        }
        validate_folder_name(new_name)?;

        let new_path = join_path(parent_path(old_path), new_name);
        if new_path == old_path {
            return Err(AppError::Validation(
                "New folder name is the same as the current one".into(),
            ));
        }

        let old_prefix = format!("{}/", old_path);
        let keys = self.store.list_keys_under(bucket, &old_prefix).await?;

        // Only the backend can tell that the folder is gone
        if keys.is_empty() {
            return Err(AppError::Backend(format!("Folder {} not found", old_path)));
        }

        log::info!(
            "Renaming {} -> {} in {} ({} object(s))",
            old_path,
            new_path,
            bucket,
            keys.len()
        );

        let semaphore = Semaphore::new(self.max_concurrent);
        let outcomes = join_all(keys.iter().map(|key| {
            let semaphore = &semaphore;
            let to = renamed_key(key, old_path, &new_path);
            async move {
                let _permit = semaphore.acquire().await;
                let result = self.store.move_object(bucket, key, &to).await;
                (key.clone(), to, result)
            }
        }))
        .await;

        let mut report = RenameReport {
            old_path: old_path.to_string(),
            new_path,
            moved: Vec::new(),
            failed: Vec::new(),
        };
        for (from, to, result) in outcomes {
            match result {
                Ok(()) => report.moved.push(KeyMove { from, to }),
                Err(e) => {
                    log::warn!("Failed to move {}: {}", from, e);
                    report.failed.push(FailedItem::new(from, e));
                }
            }
        }

        // Partial success still changed the object set
        self.sync.on_mutation(MutationKind::RenameFolder);
        Ok(report)
    }

    /// Delete every object under `path/`, the marker included. Callers confirm
    /// with the user first.
    pub async fn delete_folder(&self, bucket: &str, path: &str) -> Result<DeleteResult> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(AppError::Validation("Cannot delete the bucket root".into()));
        }

        let prefix = format!("{}/", path);
        let result = self.store.delete_objects_by_prefix(bucket, &prefix).await?;

        log::info!(
            "Deleted folder {} in {}: {} removed, {} failed",
            path,
            bucket,
            result.deleted,
            result.errors.len()
        );
        self.sync.on_mutation(MutationKind::DeleteFolder);
        Ok(result)
    }
}
