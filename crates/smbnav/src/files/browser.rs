//! Paginated, filtered directory listing.
//!
//! The server's search results are consumed in arrival order. The type
//! filter is applied while collecting, so the page limit counts only
//! qualifying entries; the search term narrows the collected page
//! afterwards. The final page is sorted directories first, then by name
//! ignoring case.

use std::cmp::Ordering;
use std::str::FromStr;

use protocol::PathInfo;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ListingError;
use crate::path::PathCursor;
use crate::session::ConnectionManager;

/// Default page size.
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// Name of the synthetic parent-directory row.
pub const GO_UP_NAME: &str = "..";

/// Which entry kinds a listing keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryFilter {
    #[default]
    All,
    FoldersOnly,
    FilesOnly,
}

impl EntryFilter {
    fn accepts(self, is_directory: bool) -> bool {
        match self {
            EntryFilter::All => true,
            EntryFilter::FoldersOnly => is_directory,
            EntryFilter::FilesOnly => !is_directory,
        }
    }
}

impl FromStr for EntryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(EntryFilter::All),
            "folders" | "folders_only" | "dirs" => Ok(EntryFilter::FoldersOnly),
            "files" | "files_only" => Ok(EntryFilter::FilesOnly),
            other => Err(format!("unknown filter '{}': expected all, folders or files", other)),
        }
    }
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
    pub size_bytes: u64,
}

impl DirectoryEntry {
    /// The synthetic row that navigates to the parent directory.
    pub fn go_up() -> Self {
        Self {
            name: GO_UP_NAME.to_string(),
            is_directory: true,
            size_bytes: 0,
        }
    }

    pub fn is_go_up(&self) -> bool {
        self.is_directory && self.name == GO_UP_NAME
    }
}

impl From<PathInfo> for DirectoryEntry {
    fn from(info: PathInfo) -> Self {
        Self {
            name: info.long_name,
            is_directory: info.is_directory,
            size_bytes: if info.is_directory { 0 } else { info.file_size },
        }
    }
}

/// Directories first, then case-insensitive name.
fn display_order(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Parameters of one listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: usize,
    pub filter: EntryFilter,
    pub search: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT)
    }
}

impl ListQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            filter: EntryFilter::All,
            search: None,
        }
    }

    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Keep only names containing `term`, ignoring case. Blank terms are ignored.
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = if term.trim().is_empty() {
            None
        } else {
            Some(term.trim().to_string())
        };
        self
    }
}

/// A page of directory entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub path: PathCursor,
    pub entries: Vec<DirectoryEntry>,
    /// More qualifying entries existed past the page limit.
    pub limit_reached: bool,
}

impl Listing {
    pub fn empty(path: PathCursor) -> Self {
        Self {
            path,
            entries: Vec::new(),
            limit_reached: false,
        }
    }

    /// Rows to display: the go-up row when not at the root, then the entries.
    pub fn rows(&self) -> Vec<DirectoryEntry> {
        let mut rows = Vec::with_capacity(self.entries.len() + 1);
        if !self.path.is_root() {
            rows.push(DirectoryEntry::go_up());
        }
        rows.extend(self.entries.iter().cloned());
        rows
    }
}

/// Lists directories of the current share.
#[derive(Debug, Clone, Default)]
pub struct DirectoryBrowser;

impl DirectoryBrowser {
    pub fn new() -> Self {
        Self
    }

    /// List `path`, degrading any failure to an empty listing.
    pub fn list_entries(
        &self,
        manager: &mut ConnectionManager,
        path: &PathCursor,
        query: &ListQuery,
    ) -> Listing {
        match self.try_list_entries(manager, path, query) {
            Ok(listing) => listing,
            Err(ListingError::NoShareSelected) => {
                debug!(path = %path, "Listing skipped: no share selected");
                Listing::empty(path.clone())
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Listing failed");
                Listing::empty(path.clone())
            }
        }
    }

    /// List `path`, reporting failures.
    pub fn try_list_entries(
        &self,
        manager: &mut ConnectionManager,
        path: &PathCursor,
        query: &ListQuery,
    ) -> Result<Listing, ListingError> {
        let share = manager
            .current_share()
            .map(str::to_owned)
            .ok_or(ListingError::NoShareSelected)?;
        let pattern = path.search_pattern();
        debug!(share = %share, pattern = %pattern, limit = query.limit, "Listing directory");

        let raw = manager
            .with_session(|s| s.list_path(&share, &pattern))
            .ok_or(ListingError::NoShareSelected)?
            .map_err(|source| ListingError::Protocol {
                share: share.clone(),
                path: path.to_string(),
                source,
            })?;

        let mut entries = Vec::new();
        let mut limit_reached = false;
        for info in raw {
            if info.long_name == "." || info.long_name == ".." {
                continue;
            }
            if !query.filter.accepts(info.is_directory) {
                continue;
            }
            if entries.len() >= query.limit {
                limit_reached = true;
                break;
            }
            entries.push(DirectoryEntry::from(info));
        }

        if let Some(term) = &query.search {
            let term = term.to_lowercase();
            entries.retain(|e| e.name.to_lowercase().contains(&term));
        }
        entries.sort_by(display_order);

        debug!(
            share = %share,
            path = %path,
            count = entries.len(),
            limit_reached,
            "Listing complete"
        );
        Ok(Listing {
            path: path.clone(),
            entries,
            limit_reached,
        })
    }
}
