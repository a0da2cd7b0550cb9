//! Session record and lifecycle states.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Lifecycle of the single controller session.
///
/// ```text
/// Disconnected ──connect──► Connecting ──ok──► Connected ──select──► ShareSelected
///      ▲                        │                  │                     │
///      └────────fail────────────┘                  └──disconnect/fatal───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ShareSelected,
}

impl SessionState {
    /// Whether a live, logged-in handle exists.
    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::ShareSelected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::ShareSelected => "share selected",
        };
        f.write_str(s)
    }
}

/// Login credentials. An empty username requests guest access.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
        }
    }

    /// Guest login.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// The one session a controller manages.
#[derive(Debug, Clone)]
pub struct Session {
    pub server_name: String,
    pub server_address: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub state: SessionState,
    pub current_share: Option<String>,
}

impl Session {
    pub(crate) fn new(
        server_name: &str,
        server_address: &str,
        port: u16,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Self {
        Self {
            server_name: server_name.to_string(),
            server_address: server_address.to_string(),
            port,
            credentials,
            timeout,
            state: SessionState::Disconnected,
            current_share: None,
        }
    }

    /// `server_name (address:port)`, for logs and messages.
    pub fn target(&self) -> String {
        format!("{} ({}:{})", self.server_name, self.server_address, self.port)
    }
}
