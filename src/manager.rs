//! Storage manager: the one object the presentation layer talks to.
//!
//! It owns the selected bucket and every core component, exposes the
//! imperative operations, and publishes navigation, listing and tree state on
//! `watch` channels. Failures are turned into notifications and returned; they
//! never leave the manager in a non-navigable state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::config::{AppConfig, ConfigStore};
use crate::error::{AppError, Result};
use crate::listing::{
    fetch_listing, matches_term, page_count, paginate, FileEntry, ListingPage, ListingView,
    PageSize, SortColumn,
};
use crate::mutator::{normalize_path, FolderMutator, RenameReport};
use crate::navigation::{Breadcrumb, PathNavigator};
use crate::notify::{Notification, NotificationCenter};
use crate::preview::{self, FileDetails, PreviewData};
use crate::s3::client::S3ClientManager;
use crate::s3::gateway::{BucketInfo, DeleteResult, ObjectStore};
use crate::s3::objects::S3Gateway;
use crate::sync::{FetchTag, MutationKind, NavigationState, ViewSynchronizer};
use crate::transfer::{BatchReport, TransferCoordinator, TransferEvent, TransferOptions};
use crate::tree::{fetch_tree, join_path, parent_path, FolderNode};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingState {
    pub path: String,
    pub entries: Vec<FileEntry>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeState {
    pub tree: Option<FolderNode>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPage {
    pub items: Vec<BucketInfo>,
    pub total_items: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// Filter bucket names by `term` and cut out 1-based `page`.
pub fn filter_buckets(
    buckets: &[BucketInfo],
    term: &str,
    page: usize,
    page_size: PageSize,
) -> BucketPage {
    let matched: Vec<BucketInfo> = buckets
        .iter()
        .filter(|b| matches_term(&b.name, term))
        .cloned()
        .collect();
    let total_pages = page_count(matched.len(), page_size);
    let page = page.clamp(1, total_pages);
    BucketPage {
        items: paginate(&matched, page, page_size),
        total_items: matched.len(),
        page,
        total_pages,
    }
}

/// Key of a listing entry under `path`; folders end with `/`.
pub fn entry_key(path: &str, entry: &FileEntry) -> String {
    let key = join_path(path, &entry.name);
    if entry.is_folder {
        format!("{}/", key)
    } else {
        key
    }
}

/// Where `current` ends up once folder `old` becomes `new`, if it was inside.
fn rebase_path(current: &str, old: &str, new: &str) -> Option<String> {
    if current == old {
        Some(new.to_string())
    } else {
        current
            .strip_prefix(old)
            .filter(|rest| rest.starts_with('/'))
            .map(|rest| format!("{}{}", new, rest))
    }
}

fn is_within(current: &str, folder: &str) -> bool {
    current == folder || current.starts_with(&format!("{}/", folder))
}

pub struct StorageManager {
    store: Arc<dyn ObjectStore>,
    sync: Arc<ViewSynchronizer>,
    navigator: PathNavigator,
    mutator: FolderMutator,
    transfers: TransferCoordinator,
    notifications: NotificationCenter,
    bucket: RwLock<Option<String>>,
    view: Mutex<ListingView>,
    listing: watch::Sender<ListingState>,
    tree: watch::Sender<TreeState>,
    tree_generation: AtomicU64,
    download_dir: PathBuf,
}

impl StorageManager {
    pub fn new(store: Arc<dyn ObjectStore>, options: TransferOptions) -> Self {
        let sync = Arc::new(ViewSynchronizer::new());
        let (listing, _) = watch::channel(ListingState::default());
        let (tree, _) = watch::channel(TreeState::default());
        Self {
            navigator: PathNavigator::new(sync.clone()),
            mutator: FolderMutator::new(store.clone(), sync.clone())
                .with_max_concurrent(options.max_concurrent),
            transfers: TransferCoordinator::new(store.clone(), sync.clone(), options),
            notifications: NotificationCenter::new(),
            store,
            sync,
            bucket: RwLock::new(None),
            view: Mutex::new(ListingView::default()),
            listing,
            tree,
            tree_generation: AtomicU64::new(0),
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Build a manager over the S3-compatible endpoint described by `config`.
    /// Any configuration problem comes back as `AppError::Configuration`.
    pub async fn connect(config: &AppConfig, clients: &S3ClientManager) -> Result<Self> {
        let validated = config.validated()?;
        let client = clients.client_for(&validated).await?;
        log::info!("Connected storage manager for project {}", validated.project_id);
        Ok(Self::new(
            Arc::new(S3Gateway::new(client)),
            TransferOptions::default(),
        ))
    }

    /// Apply a changed configuration: persist it, drop the project's cached
    /// client and connect again with the new credentials. Nothing is saved
    /// when `config` does not validate.
    pub async fn reconfigure(
        config: &AppConfig,
        config_store: &ConfigStore,
        clients: &S3ClientManager,
    ) -> Result<Self> {
        let validated = config.validated()?;
        config_store.save(config)?;
        let client = clients.reconfigure(&validated).await?;
        log::info!("Reconnected storage manager for project {}", validated.project_id);
        Ok(Self::new(
            Arc::new(S3Gateway::new(client)),
            TransferOptions::default(),
        ))
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    // Subscriptions

    pub fn navigation(&self) -> watch::Receiver<NavigationState> {
        self.sync.subscribe()
    }

    pub fn listing(&self) -> watch::Receiver<ListingState> {
        self.listing.subscribe()
    }

    pub fn tree(&self) -> watch::Receiver<TreeState> {
        self.tree.subscribe()
    }

    pub fn transfer_events(&self) -> broadcast::Receiver<TransferEvent> {
        self.transfers.subscribe()
    }

    pub fn notification_events(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    // Buckets

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.store.list_buckets().await.map_err(|e| {
            self.notifications.error("Failed to list buckets", &e);
            e
        })
    }

    pub fn selected_bucket(&self) -> Option<String> {
        self.bucket.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn require_bucket(&self) -> Result<String> {
        self.selected_bucket()
            .ok_or_else(|| AppError::Validation("No bucket selected".into()))
    }

    /// Switch buckets and land on the root.
    pub async fn select_bucket(&self, bucket: impl Into<String>) {
        let bucket = bucket.into();
        log::info!("Selected bucket {}", bucket);
        *self.bucket.write().unwrap_or_else(|e| e.into_inner()) = Some(bucket);
        self.with_view(|view| *view = ListingView::default());
        let tag = self.navigator.navigate_to("");
        tokio::join!(self.refresh_listing(tag), self.refresh_tree());
    }

    // Navigation

    pub fn current_path(&self) -> String {
        self.navigator.current_path()
    }

    pub async fn navigate(&self, path: &str) {
        self.clear_selection();
        let tag = self.navigator.navigate_to(normalize_path(path));
        self.refresh_listing(tag).await;
    }

    pub async fn navigate_up(&self) {
        if let Some(tag) = self.navigator.navigate_up() {
            self.clear_selection();
            self.refresh_listing(tag).await;
        }
    }

    pub async fn navigate_to_breadcrumb(&self, index: usize) {
        self.clear_selection();
        let tag = self.navigator.navigate_to_breadcrumb_segment(index);
        self.refresh_listing(tag).await;
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.navigator
            .breadcrumbs(&self.selected_bucket().unwrap_or_default())
    }

    // Fetching

    /// Fetch the listing for `tag.path` and publish it only if `tag` is still
    /// current when the response lands.
    pub async fn refresh_listing(&self, tag: FetchTag) {
        let Some(bucket) = self.selected_bucket() else {
            return;
        };

        self.listing.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = fetch_listing(self.store.as_ref(), &bucket, &tag.path).await;

        if !self.sync.is_current(&tag) {
            log::debug!(
                "Discarding stale listing for {:?} (epoch {})",
                tag.path,
                tag.epoch
            );
            return;
        }

        match result {
            Ok(entries) => {
                self.with_view(|view| view.replace(&tag.path, entries.clone()));
                self.listing.send_replace(ListingState {
                    path: tag.path,
                    entries,
                    loading: false,
                    error: None,
                });
            }
            Err(e) => {
                self.notifications
                    .error(&format!("Failed to list {}", display_path(&tag.path)), &e);
                self.listing.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(e.to_string());
                });
            }
        }
    }

    /// Rebuild the folder tree. Only the most recently issued tree fetch is
    /// applied.
    pub async fn refresh_tree(&self) {
        let Some(bucket) = self.selected_bucket() else {
            return;
        };

        let generation = self.tree_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tree.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = fetch_tree(self.store.as_ref(), &bucket).await;

        if self.tree_generation.load(Ordering::SeqCst) != generation {
            log::debug!("Discarding stale folder tree (generation {})", generation);
            return;
        }

        match result {
            Ok(tree) => {
                self.tree.send_replace(TreeState {
                    tree: Some(tree),
                    loading: false,
                    error: None,
                });
            }
            Err(e) => {
                self.notifications.error("Failed to load folder tree", &e);
                self.tree.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(e.to_string());
                });
            }
        }
    }

    /// Refetch listing and tree in place, discarding anything in flight.
    pub async fn refresh(&self) {
        self.sync.on_mutation(MutationKind::Refresh);
        self.refetch_views().await;
    }

    async fn refetch_views(&self) {
        tokio::join!(self.refresh_listing(self.sync.tag()), self.refresh_tree());
    }

    // Listing query and selection

    fn with_view<T>(&self, f: impl FnOnce(&mut ListingView) -> T) -> T {
        let mut view = self.view.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut view)
    }

    pub fn page(&self) -> ListingPage {
        self.with_view(|view| view.page())
    }

    pub fn set_search(&self, term: &str) {
        self.with_view(|view| view.query_mut().set_search(term));
    }

    pub fn toggle_sort(&self, column: SortColumn) {
        self.with_view(|view| view.query_mut().toggle_sort(column));
    }

    pub fn set_page(&self, page: usize) {
        self.with_view(|view| view.query_mut().set_page(page));
    }

    pub fn set_page_size(&self, page_size: usize) -> Result<()> {
        let page_size = PageSize::try_from(page_size)?;
        self.with_view(|view| view.query_mut().set_page_size(page_size));
        Ok(())
    }

    /// Replace the selection; names not in the current listing are ignored.
    /// Returns how many entries ended up selected.
    pub fn select_files<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_view(|view| view.select(names))
    }

    pub fn toggle_selected(&self, name: &str) {
        self.with_view(|view| view.toggle_selected(name));
    }

    pub fn clear_selection(&self) {
        self.with_view(|view| view.clear_selection());
    }

    pub fn selection(&self) -> Vec<String> {
        self.with_view(|view| view.selection())
    }

    // Folder operations

    /// Create `name` in the current folder.
    pub async fn create_folder(&self, name: &str) -> Result<String> {
        self.create_folder_in(&self.current_path(), name).await
    }

    /// Create `name` under any folder, e.g. one picked in the tree. The
    /// current path is left alone.
    pub async fn create_folder_in(&self, parent: &str, name: &str) -> Result<String> {
        let bucket = self.require_bucket()?;
        match self.mutator.create_child_folder(&bucket, parent, name).await {
            Ok(key) => {
                self.notifications.success(format!("Created folder {}", key));
                self.refetch_views().await;
                Ok(key)
            }
            Err(e) => {
                self.notifications.error("Failed to create folder", &e);
                Err(e)
            }
        }
    }

    /// Best-effort rename. A partial failure still returns the report; the
    /// failed keys are also raised as a notification.
    pub async fn rename_folder(&self, path: &str, new_name: &str) -> Result<RenameReport> {
        let bucket = self.require_bucket()?;
        let report = match self.mutator.rename_folder(&bucket, path, new_name).await {
            Ok(report) => report,
            Err(e) => {
                self.notifications.error("Failed to rename folder", &e);
                return Err(e);
            }
        };

        if report.is_complete() {
            self.notifications.success(format!(
                "Renamed {} to {}",
                report.old_path, report.new_path
            ));
        } else {
            self.notifications.error(
                &format!("Rename of {} incomplete", report.old_path),
                &AppError::PartialBatch(report.failed.clone()),
            );
        }

        // Follow the rename if we were inside the folder and it fully moved
        let current = self.current_path();
        match rebase_path(&current, &report.old_path, &report.new_path) {
            Some(moved) if report.is_complete() => {
                let tag = self.navigator.navigate_to(moved);
                tokio::join!(self.refresh_listing(tag), self.refresh_tree());
            }
            _ => self.refetch_views().await,
        }
        Ok(report)
    }

    pub async fn delete_folder(&self, path: &str) -> Result<DeleteResult> {
        let bucket = self.require_bucket()?;
        let path = normalize_path(path).to_string();
        let result = match self.mutator.delete_folder(&bucket, &path).await {
            Ok(result) => result,
            Err(e) => {
                self.notifications.error("Failed to delete folder", &e);
                return Err(e);
            }
        };

        if result.errors.is_empty() {
            self.notifications.success(format!("Deleted folder {}", path));
        } else {
            self.notifications.error(
                &format!("Delete of {} incomplete", path),
                &AppError::PartialBatch(result.errors.clone()),
            );
        }

        if is_within(&self.current_path(), &path) {
            let tag = self.navigator.navigate_to(parent_path(&path));
            tokio::join!(self.refresh_listing(tag), self.refresh_tree());
        } else {
            self.refetch_views().await;
        }
        Ok(result)
    }

    // File operations

    /// Upload local files into the current folder.
    pub async fn upload_files(&self, sources: Vec<PathBuf>) -> Result<BatchReport> {
        let bucket = self.require_bucket()?;
        let destination = self.current_path();
        let report = self
            .transfers
            .bulk_upload(&bucket, &destination, sources)
            .await;
        self.finish_batch("Upload", &report);
        self.refetch_views().await;
        Ok(report)
    }

    /// Download the selected files, or `names` if given, into the download
    /// directory. Folders in the selection are skipped.
    pub async fn download_files(&self, names: Option<Vec<String>>) -> Result<BatchReport> {
        let bucket = self.require_bucket()?;
        let path = self.current_path();
        let entries = self.entries_for(names);
        let keys: Vec<String> = entries
            .iter()
            .filter(|e| !e.is_folder)
            .map(|e| entry_key(&path, e))
            .collect();
        if keys.is_empty() {
            return Err(AppError::Validation("No files selected".into()));
        }

        let report = self
            .transfers
            .bulk_download(&bucket, keys, &self.download_dir)
            .await;
        self.finish_batch("Download", &report);
        Ok(report)
    }

    /// Delete the selected entries, or `names` if given. Folder entries delete
    /// everything beneath them.
    pub async fn delete_files(&self, names: Option<Vec<String>>) -> Result<BatchReport> {
        let bucket = self.require_bucket()?;
        let path = self.current_path();
        let keys: Vec<String> = self
            .entries_for(names)
            .iter()
            .map(|e| entry_key(&path, e))
            .collect();
        if keys.is_empty() {
            return Err(AppError::Validation("No files selected".into()));
        }

        let report = self.transfers.bulk_delete(&bucket, keys).await;
        self.finish_batch("Delete", &report);
        self.refetch_views().await;
        Ok(report)
    }

    fn entries_for(&self, names: Option<Vec<String>>) -> Vec<FileEntry> {
        self.with_view(|view| match names {
            Some(names) => names
                .iter()
                .filter_map(|n| view.find(n).cloned())
                .collect(),
            None => view.selected_entries(),
        })
    }

    fn finish_batch(&self, action: &str, report: &BatchReport) {
        if report.all_succeeded() {
            self.clear_selection();
            self.notifications.success(format!(
                "{} of {} item(s) complete",
                action,
                report.succeeded.len()
            ));
        } else {
            self.notifications.error(
                &format!("{} incomplete", action),
                &AppError::PartialBatch(report.failed.clone()),
            );
        }
    }

    // Inspection

    fn key_for_name(&self, name: &str) -> Result<String> {
        let path = self.current_path();
        self.with_view(|view| view.find(name).map(|e| entry_key(&path, e)))
            .ok_or_else(|| AppError::Validation(format!("{} is not in the current listing", name)))
    }

    pub async fn file_details(&self, name: &str) -> Result<FileDetails> {
        let bucket = self.require_bucket()?;
        let key = self.key_for_name(name)?;
        preview::file_details(self.store.as_ref(), &bucket, &key)
            .await
            .map_err(|e| {
                self.notifications.error("Failed to load file details", &e);
                e
            })
    }

    pub async fn preview(&self, name: &str) -> Result<PreviewData> {
        let bucket = self.require_bucket()?;
        let key = self.key_for_name(name)?;
        preview::get_preview(self.store.as_ref(), &bucket, &key)
            .await
            .map_err(|e| {
                self.notifications.error("Failed to preview file", &e);
                e
            })
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "bucket root"
    } else {
        path
    }
}
