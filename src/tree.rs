//! Synthetic folder hierarchy derived from a bucket's flat key set.
//!
//! The tree is a view: it is rebuilt from a full key listing on every refresh
//! and never patched in place.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::error::Result;
use crate::s3::gateway::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderNode {
    pub name: String,
    /// Full synthetic path, no leading or trailing slash. `""` is the bucket root.
    pub path: String,
    pub children: Vec<FolderNode>,
}

/// Parent of a synthetic path; `""` for top-level folders and the root.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Child path under `parent`, with no separator when the parent is the root.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Every folder path implied by `keys`, sorted ascending.
///
/// Each non-final segment of a key names a folder; a key ending in `/` is an
/// explicit folder marker and names its own full path too.
pub fn folder_paths<'a, I>(keys: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut folders = BTreeSet::new();

    for key in keys {
        let is_marker = key.ends_with('/');
        let normalized = key.strip_suffix('/').unwrap_or(key);
        // Empty segments (leading or doubled slashes) never name a folder
        let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();

        let mut current = String::new();
        for (index, part) in parts.iter().enumerate() {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            if index < parts.len() - 1 || is_marker {
                folders.insert(current.clone());
            }
        }
    }

    folders
}

/// Build the folder tree for `bucket` from its keys.
///
/// Siblings come out ordered by name, since they share their parent's prefix
/// and paths are processed in ascending order.
pub fn build_tree<'a, I>(bucket: &str, keys: I) -> FolderNode
where
    I: IntoIterator<Item = &'a str>,
{
    let folders = folder_paths(keys);

    let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for path in &folders {
        let parent = parent_path(path);
        // A parent missing from the set hangs off the root instead
        let attach_to = if parent.is_empty() || folders.contains(parent) {
            parent
        } else {
            ""
        };
        children_of.entry(attach_to).or_default().push(path.as_str());
    }

    FolderNode {
        name: bucket.to_string(),
        path: String::new(),
        children: assemble("", &children_of),
    }
}

fn assemble(path: &str, children_of: &HashMap<&str, Vec<&str>>) -> Vec<FolderNode> {
    children_of
        .get(path)
        .map(|children| {
            children
                .iter()
                .map(|&child| FolderNode {
                    name: child.rsplit('/').next().unwrap_or(child).to_string(),
                    path: child.to_string(),
                    children: assemble(child, children_of),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Fetch the full key listing and derive the tree.
pub async fn fetch_tree(store: &dyn ObjectStore, bucket: &str) -> Result<FolderNode> {
    let keys = store.list_all_keys(bucket).await?;
    let tree = build_tree(bucket, keys.iter().map(String::as_str));
    log::debug!(
        "Built folder tree for {} from {} keys ({} folders)",
        bucket,
        keys.len(),
        tree.folder_count()
    );
    Ok(tree)
}

impl FolderNode {
    /// Number of folders below this node.
    pub fn folder_count(&self) -> usize {
        self.children.iter().map(|c| 1 + c.folder_count()).sum()
    }

    /// This node's path and every descendant's, depth first.
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths = vec![self.path.clone()];
        for child in &self.children {
            paths.extend(child.all_paths());
        }
        paths
    }

    pub fn find(&self, path: &str) -> Option<&FolderNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// Case-insensitive: true if this folder's name or any descendant's name
    /// contains `term`.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.matches_lowercase(&term)
    }

    fn matches_lowercase(&self, term: &str) -> bool {
        self.name.to_lowercase().contains(term)
            || self.children.iter().any(|c| c.matches_lowercase(term))
    }

    /// Copy of the tree keeping only matching branches. The root is always kept.
    pub fn filtered(&self, term: &str) -> FolderNode {
        let term = term.to_lowercase();
        FolderNode {
            name: self.name.clone(),
            path: self.path.clone(),
            children: self
                .children
                .iter()
                .filter_map(|c| c.prune(&term))
                .collect(),
        }
    }

    fn prune(&self, term: &str) -> Option<FolderNode> {
        if !self.matches_lowercase(term) {
            return None;
        }
        Some(FolderNode {
            name: self.name.clone(),
            path: self.path.clone(),
            children: self.children.iter().filter_map(|c| c.prune(term)).collect(),
        })
    }
}

/// Which folders are expanded in the tree panel.
#[derive(Debug, Clone, Default)]
pub struct TreeExpansion {
    expanded: HashSet<String>,
}

impl TreeExpansion {
    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    pub fn toggle(&mut self, path: &str) {
        if !self.expanded.remove(path) {
            self.expanded.insert(path.to_string());
        }
    }

    pub fn expand_all(&mut self, tree: &FolderNode) {
        self.expanded = tree.all_paths().into_iter().collect();
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }
}
