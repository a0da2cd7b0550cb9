//! The share-protocol client interface.
//!
//! A [`Connector`] opens transports; each returns a [`ProtocolSession`], the
//! handle to one logged-in connection. Sessions are not safe for concurrent
//! use: every method takes `&mut self`, and callers that share a session
//! across threads must serialize access themselves.

use std::time::Duration;

use crate::error::Result;
use crate::types::{FileId, PathInfo, RawShareInfo, TreeId};

/// Opens transports to a share server.
pub trait Connector: Send + Sync {
    /// Establish the transport to `address:port`.
    ///
    /// `server_name` is the NetBIOS name the server answers to. `timeout`
    /// bounds every subsequent request on the returned session.
    fn connect(
        &self,
        server_name: &str,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn ProtocolSession>>;
}

/// One connection to a share server.
pub trait ProtocolSession: Send {
    /// Log in. Empty `username` and `password` request guest access.
    fn authenticate(&mut self, username: &str, password: &str, domain: &str) -> Result<()>;

    /// Enumerate the shares the server exposes.
    fn list_shares(&mut self) -> Result<Vec<RawShareInfo>>;

    /// Attach to a share.
    fn connect_tree(&mut self, share: &str) -> Result<TreeId>;

    /// Detach from a share.
    fn disconnect_tree(&mut self, tree: TreeId) -> Result<()>;

    /// Search a directory of `share` with a `\dir\mask` pattern.
    fn list_path(&mut self, share: &str, pattern: &str) -> Result<Vec<PathInfo>>;

    /// Open an existing file for reading.
    fn open_file(&mut self, tree: TreeId, path: &str) -> Result<FileId>;

    /// Size of an open file in bytes.
    fn file_size(&mut self, tree: TreeId, file: FileId) -> Result<u64>;

    /// Read up to `length` bytes at `offset`. An empty result means end of file.
    fn read_file(
        &mut self,
        tree: TreeId,
        file: FileId,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>>;

    /// Close an open file.
    fn close_file(&mut self, tree: TreeId, file: FileId) -> Result<()>;

    /// Create (or truncate) a file for writing.
    fn create_file(&mut self, tree: TreeId, path: &str) -> Result<FileId>;

    /// Append `data` to a file opened with [`ProtocolSession::create_file`].
    ///
    /// Returns the number of bytes written.
    fn write_file(&mut self, tree: TreeId, file: FileId, data: &[u8]) -> Result<usize>;

    /// Create a directory on `share`.
    fn create_directory(&mut self, share: &str, path: &str) -> Result<()>;

    /// End the session.
    fn logoff(&mut self) -> Result<()>;
}
