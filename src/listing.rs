//! One level of a bucket as a table: filtering, sorting, paging and selection
//! over an already-fetched listing, without refetching.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::s3::gateway::{ObjectStore, PrefixListing};

const LISTING_DELIMITER: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Base name only; folders carry no trailing slash.
    pub name: String,
    pub size: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_folder: bool,
    pub content_type: Option<String>,
}

impl FileEntry {
    pub fn display_size(&self) -> String {
        if self.is_folder {
            "-".to_string()
        } else {
            format_file_size(self.size)
        }
    }

    pub fn display_updated(&self) -> String {
        match (self.is_folder, &self.updated_at) {
            (true, _) | (false, None) => "-".to_string(),
            (false, Some(at)) => at.to_rfc3339(),
        }
    }
}

/// Human-readable size: `Bytes`, `KB`, `MB`, `GB`, `TB` in powers of 1024.
pub fn format_file_size(bytes: u64) -> String {
    const SIZES: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Byte".to_string();
    }
    let mut i = 0;
    while i < SIZES.len() - 1 && bytes >= 1024u64.pow(i as u32 + 1) {
        i += 1;
    }
    let value = bytes as f64 / 1024f64.powi(i as i32);
    format!("{} {}", value.round() as u64, SIZES[i])
}

/// Listing prefix for a synthetic path: `""` at the root, `path/` elsewhere.
pub fn prefix_for(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}/", path)
    }
}

/// Turn one delimited listing into entries, folders first. The folder marker
/// equal to the prefix itself is not an entry.
pub fn entries_from_listing(prefix: &str, listing: PrefixListing) -> Vec<FileEntry> {
    let folders = listing.prefixes.into_iter().filter_map(|p| {
        let name = p
            .strip_prefix(prefix)
            .unwrap_or(p.as_str())
            .trim_end_matches('/')
            .to_string();
        if name.is_empty() {
            return None;
        }
        Some(FileEntry {
            name,
            size: 0,
            updated_at: None,
            is_folder: true,
            content_type: None,
        })
    });

    let files = listing
        .objects
        .into_iter()
        .filter(|obj| obj.key != prefix)
        .map(|obj| FileEntry {
            name: obj
                .key
                .rsplit('/')
                .next()
                .unwrap_or(obj.key.as_str())
                .to_string(),
            size: obj.size,
            updated_at: obj.last_modified,
            is_folder: false,
            content_type: None,
        });

    folders.chain(files).collect()
}

/// Fetch the entries directly under `path`.
pub async fn fetch_listing(
    store: &dyn ObjectStore,
    bucket: &str,
    path: &str,
) -> Result<Vec<FileEntry>> {
    let prefix = prefix_for(path);
    let listing = store
        .list_prefixed(bucket, &prefix, LISTING_DELIMITER)
        .await?;
    Ok(entries_from_listing(&prefix, listing))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    #[default]
    Name,
    Size,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum PageSize {
    Five,
    #[default]
    Ten,
    TwentyFive,
    Fifty,
}

impl PageSize {
    pub fn get(self) -> usize {
        match self {
            PageSize::Five => 5,
            PageSize::Ten => 10,
            PageSize::TwentyFive => 25,
            PageSize::Fifty => 50,
        }
    }
}

impl TryFrom<usize> for PageSize {
    type Error = AppError;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            5 => Ok(PageSize::Five),
            10 => Ok(PageSize::Ten),
            25 => Ok(PageSize::TwentyFive),
            50 => Ok(PageSize::Fifty),
            other => Err(AppError::Validation(format!(
                "Page size must be 5, 10, 25 or 50 (got {})",
                other
            ))),
        }
    }
}

/// Case-insensitive substring match; an empty term matches everything.
pub fn matches_term(name: &str, term: &str) -> bool {
    term.is_empty() || name.to_lowercase().contains(&term.to_lowercase())
}

/// Number of pages for `total` items; at least one.
pub fn page_count(total: usize, page_size: PageSize) -> usize {
    total.div_ceil(page_size.get()).max(1)
}

/// Items on 1-based `page`.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: PageSize) -> Vec<T> {
    let start = page.saturating_sub(1) * page_size.get();
    items
        .iter()
        .skip(start)
        .take(page_size.get())
        .cloned()
        .collect()
}

fn compare(a: &FileEntry, b: &FileEntry, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Name => a.name.cmp(&b.name),
        SortColumn::Size => a.size.cmp(&b.size),
        SortColumn::Updated => a.updated_at.cmp(&b.updated_at),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub items: Vec<FileEntry>,
    /// Entries left after filtering, across all pages.
    pub total_items: usize,
    pub page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    pub search: String,
    pub sort_column: SortColumn,
    pub sort_direction: SortDirection,
    pub page: usize,
    pub page_size: PageSize,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort_column: SortColumn::default(),
            sort_direction: SortDirection::default(),
            page: 1,
            page_size: PageSize::default(),
        }
    }
}

impl ListingQuery {
    /// Same column flips direction; a new column sorts ascending.
    pub fn toggle_sort(&mut self, column: SortColumn) {
        if column == self.sort_column {
            self.sort_direction = self.sort_direction.flipped();
        } else {
            self.sort_column = column;
            self.sort_direction = SortDirection::Asc;
        }
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
        self.page = 1;
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.page_size = page_size;
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Filter, then stable-sort, then cut out the requested page.
    pub fn apply(&self, entries: &[FileEntry]) -> ListingPage {
        let mut matched: Vec<FileEntry> = entries
            .iter()
            .filter(|e| matches_term(&e.name, &self.search))
            .cloned()
            .collect();

        let column = self.sort_column;
        match self.sort_direction {
            SortDirection::Asc => matched.sort_by(|a, b| compare(a, b, column)),
            SortDirection::Desc => matched.sort_by(|a, b| compare(b, a, column)),
        }

        let total_pages = page_count(matched.len(), self.page_size);
        let page = self.page.clamp(1, total_pages);
        ListingPage {
            items: paginate(&matched, page, self.page_size),
            total_items: matched.len(),
            page,
            total_pages,
        }
    }
}

/// The listing currently shown, with its query and selection.
///
/// Entries are replaced wholesale on every fetch. Selection only ever names
/// entries of the current listing.
#[derive(Debug, Clone, Default)]
pub struct ListingView {
    path: String,
    entries: Vec<FileEntry>,
    query: ListingQuery,
    selection: BTreeSet<String>,
}

impl ListingView {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn query(&self) -> &ListingQuery {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut ListingQuery {
        &mut self.query
    }

    /// Install a freshly fetched listing for `path`. A different path resets
    /// the query and the selection; the same path keeps the query and drops
    /// selected names that no longer exist.
    pub fn replace(&mut self, path: &str, entries: Vec<FileEntry>) {
        if path != self.path {
            self.path = path.to_string();
            self.query = ListingQuery::default();
            self.selection.clear();
        } else {
            self.selection
                .retain(|name| entries.iter().any(|e| &e.name == name));
        }
        self.entries = entries;
    }

    pub fn page(&self) -> ListingPage {
        self.query.apply(&self.entries)
    }

    pub fn find(&self, name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Replace the selection; names not in the listing are ignored.
    pub fn select<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selection: BTreeSet<String> = names
            .into_iter()
            .filter(|n| self.find(n.as_ref()).is_some())
            .map(|n| n.as_ref().to_string())
            .collect();
        self.selection = selection;
        self.selection.len()
    }

    pub fn toggle_selected(&mut self, name: &str) {
        if self.find(name).is_none() {
            return;
        }
        if !self.selection.remove(name) {
            self.selection.insert(name.to_string());
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> Vec<String> {
        self.selection.iter().cloned().collect()
    }

    pub fn selected_entries(&self) -> Vec<FileEntry> {
        self.entries
            .iter()
            .filter(|e| self.selection.contains(&e.name))
            .cloned()
            .collect()
    }
}
