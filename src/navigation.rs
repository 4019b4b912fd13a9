use std::sync::Arc;

use serde::Serialize;

use crate::sync::{FetchTag, ViewSynchronizer};
use crate::tree::parent_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub label: String,
    pub path: String,
}

/// Owns "where am I" inside the selected bucket.
///
/// Every navigation bumps the refresh epoch, so listing and tree fetches
/// issued for an earlier location are discarded when they land.
pub struct PathNavigator {
    sync: Arc<ViewSynchronizer>,
}

impl PathNavigator {
    pub fn new(sync: Arc<ViewSynchronizer>) -> Self {
        Self { sync }
    }

    pub fn current_path(&self) -> String {
        self.sync.snapshot().current_path
    }

    /// Go to `path`. Nonexistent paths are allowed and simply list empty.
    pub fn navigate_to(&self, path: impl Into<String>) -> FetchTag {
        let tag = self.sync.navigate(path.into());
        log::debug!("Navigated to {:?} (epoch {})", tag.path, tag.epoch);
        tag
    }

    /// Drop the last segment. No-op at the bucket root.
    pub fn navigate_up(&self) -> Option<FetchTag> {
        let current = self.current_path();
        if current.is_empty() {
            return None;
        }
        Some(self.navigate_to(parent_path(&current)))
    }

    /// Segment 0 is the bucket root; segment `i` is the first `i` segments of
    /// the current path. Indexes past the end stay on the current path.
    pub fn navigate_to_breadcrumb_segment(&self, index: usize) -> FetchTag {
        let current = self.current_path();
        let path = current
            .split('/')
            .take(index)
            .collect::<Vec<_>>()
            .join("/");
        self.navigate_to(path)
    }

    /// Root crumb labelled with the bucket, then one crumb per path segment.
    pub fn breadcrumbs(&self, bucket: &str) -> Vec<Breadcrumb> {
        let current = self.current_path();
        let mut crumbs = vec![Breadcrumb {
            label: bucket.to_string(),
            path: String::new(),
        }];

        if current.is_empty() {
            return crumbs;
        }

        let segments: Vec<&str> = current.split('/').collect();
        for i in 0..segments.len() {
            crumbs.push(Breadcrumb {
                label: segments[i].to_string(),
                path: segments[..=i].join("/"),
            });
        }
        crumbs
    }
}
