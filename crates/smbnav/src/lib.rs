//! # smbnav Library
//!
//! Session and transfer controller for legacy SMB1-era file servers.
//!
//! ## Overview
//!
//! smbnav drives one authenticated session against a share server and
//! exposes what a file browser needs:
//!
//! - **Connection Management**: Connect, log in, time out, log off
//! - **Share Discovery**: Enumerate shares, falling back to probing well-known names
//! - **Directory Browsing**: Paginated, filtered and searchable listings
//! - **File Transfer**: Chunked downloads with progress, uploads, directory creation
//! - **Dispatch**: Blocking protocol work off the primary context, results back on it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Controller                             │
//! │        (cursor, completion callbacks, single core lock)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │    Share     │  │  Directory   │  │      Transfer        │  │
//! │  │   Resolver   │  │   Browser    │  │       Engine         │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘  │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                  Connection Manager                        │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │       protocol::Connector / protocol::ProtocolSession      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use smbnav::protocol::LocalServer;
//! use smbnav::{Config, Controller};
//! use tokio::runtime::Handle;
//! use tokio::sync::oneshot;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let server = LocalServer::new().with_share("Public", "/srv/public");
//!     let (controller, mut queue) =
//!         Controller::new(Arc::new(server), &config, Handle::current());
//!
//!     let (tx, rx) = oneshot::channel();
//!     controller.connect("LOCALHOST", "127.0.0.1", 139, None, move |result| {
//!         let _ = tx.send(result);
//!     });
//!     queue.wait_for(rx).await.expect("completion dropped")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`controller`]: Facade driven by user interfaces
//! - [`dispatcher`]: Blocking workers and the completion queue
//! - [`error`]: Error types per operation
//! - [`files`]: Directory browsing and file transfer
//! - [`logging`]: Tracing subscriber setup
//! - [`path`]: Share-relative browsing cursor
//! - [`session`]: Session state and the connection manager
//! - [`shares`]: Share enumeration and selection

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod files;
pub mod logging;
pub mod path;
pub mod session;
pub mod shares;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;
pub use controller::{Controller, Navigation};
pub use dispatcher::{CompletionQueue, TaskDispatcher};
pub use error::{
    ConnectionError, ControllerError, DirectoryCreateError, DispatchError, ListingError,
    ShareAccessError, TransferError,
};
pub use files::{
    DirectoryBrowser, DirectoryEntry, EntryFilter, ListQuery, Listing, TransferDirection,
    TransferEngine, TransferJob, TransferProgress,
};
pub use path::PathCursor;
pub use session::{ConnectionManager, Credentials, Session, SessionState};
pub use shares::{ShareDescriptor, ShareResolver, DEFAULT_CANDIDATE_SHARES};
