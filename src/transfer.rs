//! Bulk transfer coordinator: upload, download and delete batches with
//! per-item progress and fail-independent completion.
//!
//! Every item of a batch runs to a terminal state on its own; one item's
//! failure never cancels its siblings. When the last item settles the batch
//! emits exactly one `BatchCompleted` event and, for batches that change the
//! object set, exactly one refresh signal to the view synchronizer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};

use crate::error::{AppError, ErrorKind, FailedItem, Result};
use crate::s3::gateway::{ByteSource, ObjectStore, ProgressCallback};
use crate::sync::{MutationKind, ViewSynchronizer};
use crate::tree::join_path;

/// `name`, or `stem (n).ext` with the smallest `n` not yet in `taken`.
/// The chosen name is added to `taken`.
pub fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    };

    let mut candidate = name.to_string();
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = format!("{} ({}){}", stem, n, extension);
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Default number of items of one batch in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Upload,
    Download,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    pub id: String,
    pub batch_id: String,
    pub kind: TransferKind,
    /// Progress identity: file name for uploads, object key otherwise.
    pub item: String,
    pub source_ref: String,
    pub destination_key: Option<String>,
    pub status: TransferStatus,
    pub progress_percent: u8,
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub kind: TransferKind,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedItem>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Err(PartialBatch)` naming every failed item, if any failed.
    pub fn into_result(self) -> Result<BatchReport> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(AppError::PartialBatch(self.failed))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransferEvent {
    Started {
        transfer_id: String,
        kind: TransferKind,
        item: String,
    },
    Progress {
        transfer_id: String,
        kind: TransferKind,
        item: String,
        percent: u8,
    },
    Completed {
        transfer_id: String,
        kind: TransferKind,
        item: String,
    },
    Failed {
        transfer_id: String,
        kind: TransferKind,
        item: String,
        error: String,
    },
    BatchCompleted {
        report: BatchReport,
    },
}

impl TransferEvent {
    /// Channel name the presentation layer listens on.
    pub fn event_name(&self) -> &'static str {
        let kind = match self {
            TransferEvent::Started { kind, .. }
            | TransferEvent::Progress { kind, .. }
            | TransferEvent::Completed { kind, .. }
            | TransferEvent::Failed { kind, .. } => *kind,
            TransferEvent::BatchCompleted { report } => report.kind,
        };
        match (kind, self) {
            (TransferKind::Upload, TransferEvent::Started { .. }) => "upload-started",
            (TransferKind::Upload, TransferEvent::Progress { .. }) => "upload-progress",
            (TransferKind::Upload, TransferEvent::Completed { .. }) => "upload-completed",
            (TransferKind::Upload, TransferEvent::Failed { .. }) => "upload-failed",
            (TransferKind::Upload, TransferEvent::BatchCompleted { .. }) => "bulk-upload-complete",
            (TransferKind::Download, TransferEvent::Started { .. }) => "download-started",
            (TransferKind::Download, TransferEvent::Progress { .. }) => "download-progress",
            (TransferKind::Download, TransferEvent::Completed { .. }) => "download-completed",
            (TransferKind::Download, TransferEvent::Failed { .. }) => "download-failed",
            (TransferKind::Download, TransferEvent::BatchCompleted { .. }) => {
                "bulk-download-complete"
            }
            (TransferKind::Delete, TransferEvent::Started { .. }) => "delete-started",
            (TransferKind::Delete, TransferEvent::Progress { .. }) => "delete-progress",
            (TransferKind::Delete, TransferEvent::Completed { .. }) => "delete-completed",
            (TransferKind::Delete, TransferEvent::Failed { .. }) => "delete-failed",
            (TransferKind::Delete, TransferEvent::BatchCompleted { .. }) => "bulk-delete-complete",
        }
    }
}

/// Rounds byte counts to whole percents and only lets increases through, so a
/// transfer's emitted percentages never go backwards.
pub struct ProgressTracker<F> {
    last: Mutex<Option<u8>>,
    emit: F,
}

impl<F> ProgressTracker<F>
where
    F: Fn(u8) + Send + Sync,
{
    pub fn new(emit: F) -> Self {
        Self {
            last: Mutex::new(None),
            emit,
        }
    }

    pub fn update(&self, bytes_transferred: u64, total_bytes: u64) {
        let percent = if total_bytes == 0 {
            100
        } else {
            ((bytes_transferred as f64 / total_bytes as f64) * 100.0)
                .round()
                .min(100.0) as u8
        };
        self.emit_if_higher(percent);
    }

    /// Final emission on success; always ends at 100.
    pub fn finish(&self) {
        self.emit_if_higher(100);
    }

    fn emit_if_higher(&self, percent: u8) {
        let should_emit = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            if last.map_or(true, |l| percent > l) {
                *last = Some(percent);
                true
            } else {
                false
            }
        };
        if should_emit {
            (self.emit)(percent);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub max_concurrent: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// One unit of work inside a batch.
struct WorkItem {
    item: String,
    source_ref: String,
    destination_key: Option<String>,
}

pub struct TransferCoordinator {
    store: Arc<dyn ObjectStore>,
    sync: Arc<ViewSynchronizer>,
    events: broadcast::Sender<TransferEvent>,
    tasks: Mutex<HashMap<String, TransferTask>>,
    options: TransferOptions,
}

impl TransferCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sync: Arc<ViewSynchronizer>,
        options: TransferOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            sync,
            events,
            tasks: Mutex::new(HashMap::new()),
            options,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    /// Tasks of batches still running.
    pub fn active_tasks(&self) -> Vec<TransferTask> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.values().cloned().collect()
    }

    /// Upload local files under `destination_prefix` (a synthetic path).
    pub async fn bulk_upload(
        &self,
        bucket: &str,
        destination_prefix: &str,
        sources: Vec<PathBuf>,
    ) -> BatchReport {
        let items = sources
            .iter()
            .map(|path| {
                let name = ByteSource::File(path.clone())
                    .name()
                    .unwrap_or_else(|| "unknown".to_string());
                WorkItem {
                    destination_key: Some(join_path(destination_prefix, &name)),
                    item: name,
                    source_ref: path.to_string_lossy().to_string(),
                }
            })
            .collect();

        self.run_batch(bucket, TransferKind::Upload, items).await
    }

    /// Download objects into `destination_dir`, one file per key named after
    /// the key's base name. Base names repeated within the batch get a
    /// numbered suffix so no two items write the same file.
    pub async fn bulk_download(
        &self,
        bucket: &str,
        keys: Vec<String>,
        destination_dir: &Path,
    ) -> BatchReport {
        let mut taken = HashSet::new();
        let items = keys
            .into_iter()
            .map(|key| {
                let base_name = key.rsplit('/').next().unwrap_or(&key);
                let file_name = unique_file_name(base_name, &mut taken);
                WorkItem {
                    destination_key: Some(
                        destination_dir.join(file_name).to_string_lossy().to_string(),
                    ),
                    source_ref: key.clone(),
                    item: key,
                }
            })
            .collect();

        self.run_batch(bucket, TransferKind::Download, items).await
    }

    /// Delete objects. Keys ending in `/` delete everything under that prefix.
    pub async fn bulk_delete(&self, bucket: &str, keys: Vec<String>) -> BatchReport {
        let items = keys
            .into_iter()
            .map(|key| WorkItem {
                source_ref: key.clone(),
                item: key,
                destination_key: None,
            })
            .collect();

        self.run_batch(bucket, TransferKind::Delete, items).await
    }

    async fn run_batch(&self, bucket: &str, kind: TransferKind, items: Vec<WorkItem>) -> BatchReport {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let tasks: Vec<TransferTask> = items
            .into_iter()
            .map(|w| TransferTask {
                id: uuid::Uuid::new_v4().to_string(),
                batch_id: batch_id.clone(),
                kind,
                item: w.item,
                source_ref: w.source_ref,
                destination_key: w.destination_key,
                status: TransferStatus::Pending,
                progress_percent: 0,
                error: None,
            })
            .collect();

        {
            let mut registry = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            for task in &tasks {
                registry.insert(task.id.clone(), task.clone());
            }
        }

        log::info!("Starting {:?} batch {} with {} item(s)", kind, batch_id, tasks.len());

        let semaphore = Semaphore::new(self.options.max_concurrent.max(1));
        let outcomes = join_all(tasks.into_iter().map(|task| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await;
                self.run_item(bucket, task).await
            }
        }))
        .await;

        let mut report = BatchReport {
            batch_id: batch_id.clone(),
            kind,
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (item, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(item),
                Err(e) => report.failed.push(FailedItem::new(item, e)),
            }
        }

        // Surfaced through the report; the tasks themselves are discarded
        {
            let mut registry = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            registry.retain(|_, t| t.batch_id != batch_id);
        }

        match kind {
            TransferKind::Upload => {
                self.sync.on_mutation(MutationKind::Upload);
            }
            TransferKind::Delete => {
                self.sync.on_mutation(MutationKind::DeleteFiles);
            }
            TransferKind::Download => {}
        }

        log::info!(
            "{:?} batch {} finished: {} succeeded, {} failed",
            kind,
            batch_id,
            report.succeeded.len(),
            report.failed.len()
        );
        let _ = self.events.send(TransferEvent::BatchCompleted {
            report: report.clone(),
        });

        report
    }

    async fn run_item(&self, bucket: &str, task: TransferTask) -> (String, Result<()>) {
        let id = task.id.clone();
        let item = task.item.clone();
        let kind = task.kind;

        self.set_status(&id, TransferStatus::InProgress, None);
        let _ = self.events.send(TransferEvent::Started {
            transfer_id: id.clone(),
            kind,
            item: item.clone(),
        });

        let tracker = ProgressTracker::new(|percent| {
            self.set_progress(&id, percent);
            let _ = self.events.send(TransferEvent::Progress {
                transfer_id: id.clone(),
                kind,
                item: item.clone(),
                percent,
            });
        });
        let callback = |done: u64, total: u64| tracker.update(done, total);

        let result = self.perform(bucket, &task, &callback).await;

        match &result {
            Ok(()) => {
                tracker.finish();
                self.set_status(&id, TransferStatus::Succeeded, None);
                let _ = self.events.send(TransferEvent::Completed {
                    transfer_id: id.clone(),
                    kind,
                    item: item.clone(),
                });
            }
            Err(e) => {
                log::warn!("{:?} of {} failed: {}", kind, item, e);
                self.set_status(&id, TransferStatus::Failed, Some(e.kind()));
                let _ = self.events.send(TransferEvent::Failed {
                    transfer_id: id.clone(),
                    kind,
                    item: item.clone(),
                    error: e.to_string(),
                });
            }
        }

        (item.clone(), result)
    }

    async fn perform(
        &self,
        bucket: &str,
        task: &TransferTask,
        progress: &dyn ProgressCallback,
    ) -> Result<()> {
        let destination = task.destination_key.clone().unwrap_or_default();
        match task.kind {
            TransferKind::Upload => {
                let path = PathBuf::from(&task.source_ref);
                let content_type = mime_guess::from_path(&path)
                    .first_or_octet_stream()
                    .to_string();
                self.store
                    .put_object_bytes(
                        bucket,
                        &destination,
                        ByteSource::File(path),
                        Some(&content_type),
                        Some(progress),
                    )
                    .await
            }
            TransferKind::Download => {
                let dest_path = PathBuf::from(destination);
                if let Some(parent) = dest_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let mut file = tokio::fs::File::create(&dest_path).await?;
                self.store
                    .get_object_bytes(bucket, &task.source_ref, &mut file, Some(progress))
                    .await?;
                file.sync_all().await?;
                Ok(())
            }
            TransferKind::Delete => {
                if task.source_ref.ends_with('/') {
                    let result = self
                        .store
                        .delete_objects_by_prefix(bucket, &task.source_ref)
                        .await?;
                    if !result.errors.is_empty() {
                        return Err(AppError::PartialBatch(result.errors));
                    }
                    Ok(())
                } else {
                    self.store.delete_object(bucket, &task.source_ref).await
                }
            }
        }
    }

    fn set_status(&self, id: &str, status: TransferStatus, error: Option<ErrorKind>) {
        let mut registry = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = registry.get_mut(id) {
            task.status = status;
            task.error = error;
        }
    }

    fn set_progress(&self, id: &str, percent: u8) {
        let mut registry = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = registry.get_mut(id) {
            task.progress_percent = percent;
        }
    }
}
