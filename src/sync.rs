//! Refresh epoch and navigation state shared by every dependent view.
//!
//! Views never patch their data after a mutation; they observe the epoch and
//! refetch. Every fetch is tagged with the `(path, epoch)` it was issued under,
//! and a result is applied only while that tag is still current.

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub current_path: String,
    pub refresh_epoch: u64,
}

/// Operations that change the object set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    CreateFolder,
    RenameFolder,
    DeleteFolder,
    Upload,
    DeleteFiles,
    /// Explicit user refresh; nothing changed locally.
    Refresh,
}

/// Identity of an in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTag {
    pub path: String,
    pub epoch: u64,
}

pub struct ViewSynchronizer {
    state: watch::Sender<NavigationState>,
}

impl ViewSynchronizer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(NavigationState::default());
        Self { state }
    }

    pub fn subscribe(&self) -> watch::Receiver<NavigationState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    pub fn epoch(&self) -> u64 {
        self.state.borrow().refresh_epoch
    }

    /// Tag for a fetch issued now.
    pub fn tag(&self) -> FetchTag {
        let state = self.state.borrow();
        FetchTag {
            path: state.current_path.clone(),
            epoch: state.refresh_epoch,
        }
    }

    pub fn is_current(&self, tag: &FetchTag) -> bool {
        let state = self.state.borrow();
        state.refresh_epoch == tag.epoch && state.current_path == tag.path
    }

    /// Record a completed mutation; all subscribed views must refetch.
    pub fn on_mutation(&self, kind: MutationKind) -> u64 {
        let mut epoch = 0;
        self.state.send_modify(|state| {
            state.refresh_epoch += 1;
            epoch = state.refresh_epoch;
        });
        log::debug!("Refresh epoch {} after {:?}", epoch, kind);
        epoch
    }

    /// Move to `path` and bump the epoch in one step. Only the path navigator
    /// calls this; it owns `current_path`.
    pub(crate) fn navigate(&self, path: String) -> FetchTag {
        let mut tag = FetchTag {
            path: String::new(),
            epoch: 0,
        };
        self.state.send_modify(|state| {
            state.current_path = path;
            state.refresh_epoch += 1;
            tag = FetchTag {
                path: state.current_path.clone(),
                epoch: state.refresh_epoch,
            };
        });
        tag
    }
}

impl Default for ViewSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
