//! Error types for the controller.
//!
//! Every component catches protocol and local I/O failures at its boundary
//! and turns them into one of these typed outcomes. Nothing retries.

use std::path::PathBuf;
use std::time::Duration;

use protocol::ProtocolError;
use thiserror::Error;

/// Errors establishing or tearing down the session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A session is already open; disconnect first.
    #[error("already connected to {0}")]
    AlreadyConnected(String),

    /// The server address is empty or malformed.
    #[error("invalid server address: {0:?}")]
    InvalidAddress(String),

    /// The transport could not be established.
    #[error("cannot reach {address}:{port}: {source}")]
    Unreachable {
        address: String,
        port: u16,
        #[source]
        source: ProtocolError,
    },

    /// The server rejected the credentials.
    #[error("login as '{user}' rejected: {source}")]
    AuthenticationFailed {
        user: String,
        #[source]
        source: ProtocolError,
    },

    /// Connect plus login did not finish within the timeout.
    #[error("connection to {address}:{port} timed out after {timeout:?}")]
    Timeout {
        address: String,
        port: u16,
        timeout: Duration,
    },
}

/// Errors selecting a share.
#[derive(Debug, Error)]
pub enum ShareAccessError {
    /// No session is open.
    #[error("not connected")]
    NotConnected,

    /// The server has no share with this name.
    #[error("no such share: {0}")]
    NoSuchShare(String),

    /// The share exists but refused the tree connect.
    #[error("access to share {share} denied: {source}")]
    AccessDenied {
        share: String,
        #[source]
        source: ProtocolError,
    },

    /// Any other protocol failure while probing the share.
    #[error("cannot open share {share}: {source}")]
    Protocol {
        share: String,
        #[source]
        source: ProtocolError,
    },
}

/// Errors listing a directory.
///
/// The browser degrades these to an empty listing; they are surfaced by
/// [`crate::files::DirectoryBrowser::try_list_entries`] only.
#[derive(Debug, Error)]
pub enum ListingError {
    /// No share is selected.
    #[error("no share selected")]
    NoShareSelected,

    /// The server failed the directory search.
    #[error("cannot list {share}{path}: {source}")]
    Protocol {
        share: String,
        path: String,
        #[source]
        source: ProtocolError,
    },
}

/// Errors moving file contents.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No share is selected.
    #[error("no share selected")]
    NoShareSelected,

    /// The server failed a request for `path`.
    #[error("remote error on {path}: {source}")]
    Remote {
        path: String,
        #[source]
        source: ProtocolError,
    },

    /// The local file could not be read or written.
    #[error("local file error on {}: {source}", path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server signalled end of file before the announced size was read.
    #[error("{path}: server ended the file after {received} of {expected} bytes")]
    ShortRead {
        path: String,
        expected: u64,
        received: u64,
    },

    /// The server accepted fewer bytes than were sent.
    #[error("{path}: server accepted {written} of {expected} bytes")]
    ShortWrite {
        path: String,
        expected: u64,
        written: u64,
    },
}

impl TransferError {
    pub(crate) fn remote(path: &str, source: ProtocolError) -> Self {
        Self::Remote {
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Local {
            path: path.into(),
            source,
        }
    }
}

/// Errors creating a remote directory.
#[derive(Debug, Error)]
pub enum DirectoryCreateError {
    /// No share is selected.
    #[error("no share selected")]
    NoShareSelected,

    /// The name is empty or refers to the current or parent directory.
    #[error("invalid directory name: {0:?}")]
    InvalidName(String),

    /// Something already exists at the path.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The share or directory is not writable.
    #[error("cannot create {path}: access denied")]
    AccessDenied {
        path: String,
        #[source]
        source: ProtocolError,
    },

    /// Any other protocol failure.
    #[error("cannot create {path}: {source}")]
    Protocol {
        path: String,
        #[source]
        source: ProtocolError,
    },
}

/// Errors delivering a dispatched operation's result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The operation panicked on its worker.
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// The worker was cancelled before finishing (runtime shutdown).
    #[error("operation cancelled")]
    Cancelled,
}

/// Umbrella error for [`crate::Controller`] operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    ShareAccess(#[from] ShareAccessError),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    DirectoryCreate(#[from] DirectoryCreateError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The session lock was poisoned by a panicking operation.
    #[error("lock poisoned: {context}")]
    LockPoisoned { context: String },
}

/// Failures that may carry a protocol error, so the connection manager can
/// spot a dead connection.
pub trait ProtocolFailure {
    fn protocol_error(&self) -> Option<&ProtocolError>;
}

impl ProtocolFailure for ProtocolError {
    fn protocol_error(&self) -> Option<&ProtocolError> {
        Some(self)
    }
}

impl ProtocolFailure for TransferError {
    fn protocol_error(&self) -> Option<&ProtocolError> {
        match self {
            TransferError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}
