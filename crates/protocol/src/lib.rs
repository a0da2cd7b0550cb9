//! # smbnav Protocol Library
//!
//! This crate defines the client side of the share protocol that smbnav
//! speaks, plus the backends it can run against.
//!
//! ## Overview
//!
//! The protocol crate is the seam between smbnav's browsing logic and the
//! wire. It provides:
//!
//! - **Session Interface**: [`Connector`] and [`ProtocolSession`], the
//!   operations a share client needs (login, tree connect, path search,
//!   file I/O, directory creation)
//! - **Value Types**: tree and file ids, raw share and path rows, path and
//!   wildcard helpers
//! - **Loopback Backend**: [`LocalServer`], which exports local directories
//!   as shares
//! - **Memory Backend**: [`MemoryServer`], a scriptable server with a call
//!   journal for tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         smbnav controller               │
//! ├─────────────────────────────────────────┤
//! │   Connector  ──►  ProtocolSession       │  one session, &mut access
//! ├────────────────────┬────────────────────┤
//! │    LocalServer     │    MemoryServer    │
//! │  (local dirs)      │  (tests)           │
//! └────────────────────┴────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use protocol::{Connector, MemoryServer};
//!
//! let server = MemoryServer::new().with_file("Public", "hello.txt", b"hi".to_vec());
//! let mut session = server
//!     .connect("SERVER", "127.0.0.1", 139, Duration::from_secs(5))
//!     .unwrap();
//! session.authenticate("", "", "").unwrap();
//!
//! let rows = session.list_path("Public", "\\*").unwrap();
//! assert!(rows.iter().any(|row| row.long_name == "hello.txt"));
//! ```
//!
//! ## Modules
//!
//! - [`session`]: Connector and session traits
//! - [`types`]: Ids, rows, path helpers
//! - [`local`]: Loopback backend over local directories
//! - [`memory`]: In-memory backend
//! - [`error`]: Error types

pub mod error;
pub mod local;
pub mod memory;
pub mod session;
pub mod types;

pub use error::{ProtocolError, Result};
pub use local::{LocalServer, LocalShare};
pub use memory::{Call, Enumeration, MemoryServer};
pub use session::{Connector, ProtocolSession};
pub use types::{
    FileId, PathInfo, RawShareInfo, TreeId, SEPARATOR, SHARE_SPECIAL, SHARE_TYPE_DISK,
    SHARE_TYPE_IPC,
};
