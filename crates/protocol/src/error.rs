//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering the failure modes a share server can report.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Connection errors
    /// The transport could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection was closed unexpectedly.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),

    // Authentication errors
    /// The server rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// An operation was attempted before a successful login.
    #[error("not authenticated: log in before using the session")]
    NotAuthenticated,

    /// The session was already logged off.
    #[error("session logged off")]
    LoggedOff,

    // Share and path errors
    /// No share with this name exists on the server.
    #[error("bad network name: {0}")]
    BadNetworkName(String),

    /// Access to the share or path was denied.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The path does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The path already exists.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// The path is malformed or escapes the share.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A tree or file id that the session does not know about.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// The server does not implement the request.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Generic I/O failure on the server side.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// Whether the session is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed(_) | ProtocolError::LoggedOff
        )
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut => ProtocolError::Timeout(err.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => {
                ProtocolError::ConnectionFailed(err.to_string())
            }
            ErrorKind::NotFound => ProtocolError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => ProtocolError::AlreadyExists(err.to_string()),
            ErrorKind::PermissionDenied => ProtocolError::AccessDenied(err.to_string()),
            _ => ProtocolError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_error_display() {
        let err = ProtocolError::ConnectionClosed("peer disconnected".to_string());
        assert_eq!(err.to_string(), "connection closed: peer disconnected");
    }

    #[test]
    fn test_bad_network_name_display() {
        let err = ProtocolError::BadNetworkName("Missing".to_string());
        assert_eq!(err.to_string(), "bad network name: Missing");
    }

    #[test]
    fn test_not_authenticated_display() {
        assert_eq!(
            ProtocolError::NotAuthenticated.to_string(),
            "not authenticated: log in before using the session"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ProtocolError::ConnectionClosed("x".into()).is_fatal());
        assert!(ProtocolError::LoggedOff.is_fatal());
        assert!(!ProtocolError::AccessDenied("x".into()).is_fatal());
        assert!(!ProtocolError::Timeout("x".into()).is_fatal());
    }

    #[test]
    fn test_from_io_error_timeout() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "too slow");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::Timeout(_)));
    }

    #[test]
    fn test_from_io_error_connection_reset() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::ConnectionClosed(_)));
    }

    #[test]
    fn test_from_io_error_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::AccessDenied(_)));
    }

    #[test]
    fn test_from_io_error_other() {
        let io_err = std::io::Error::other("disk on fire");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
