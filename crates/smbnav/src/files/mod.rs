//! Directory browsing and file transfer on the current share.
//!
//! - Paginated, filtered, sorted directory listings
//! - Chunked downloads with progress, single-write uploads
//! - Remote directory creation

pub mod browser;
pub mod transfer;

pub use browser::{
    DirectoryBrowser, DirectoryEntry, EntryFilter, ListQuery, Listing, DEFAULT_PAGE_LIMIT,
};
pub use transfer::{
    TransferDirection, TransferEngine, TransferJob, TransferProgress, DEFAULT_CHUNK_SIZE,
    MAX_CHUNK_SIZE,
};
