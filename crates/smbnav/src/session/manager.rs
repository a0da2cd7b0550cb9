//! Connection manager owning the session record and the protocol handle.
//!
//! The manager is not thread-safe on its own; the controller keeps it
//! behind the single core lock. State changes are published on a
//! `tokio::sync::watch` channel so observers never need that lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use protocol::{Connector, ProtocolError, ProtocolSession};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::{Credentials, Session, SessionState};
use crate::error::{ConnectionError, ProtocolFailure};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the session lifecycle.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    session: Option<Session>,
    handle: Option<Box<dyn ProtocolSession>>,
    state_tx: watch::Sender<SessionState>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            timeout,
            session: None,
            handle: None,
            state_tx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Disconnected)
    }

    /// Observe state changes without taking the core lock.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The session record of the current or last connection.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Share selected on the live session.
    pub fn current_share(&self) -> Option<&str> {
        match &self.session {
            Some(s) if s.state == SessionState::ShareSelected => s.current_share.as_deref(),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_state(&mut self, state: SessionState) {
        if let Some(session) = self.session.as_mut() {
            session.state = state;
        }
        self.state_tx.send_replace(state);
    }

    /// Open the transport and log in. `None` credentials mean guest access.
    pub fn connect(
        &mut self,
        server_name: &str,
        server_address: &str,
        port: u16,
        credentials: Option<Credentials>,
    ) -> Result<(), ConnectionError> {
        if self.handle.is_some() {
            let target = self
                .session
                .as_ref()
                .map(Session::target)
                .unwrap_or_default();
            warn!(target = %target, "Connect rejected: session already open");
            return Err(ConnectionError::AlreadyConnected(target));
        }

        let address = server_address.trim();
        if address.is_empty() {
            return Err(ConnectionError::InvalidAddress(server_address.to_string()));
        }

        self.session = Some(Session::new(
            server_name,
            address,
            port,
            credentials.clone(),
            self.timeout,
        ));
        self.set_state(SessionState::Connecting);
        info!(server = %server_name, address = %address, port, "Connecting");

        match self.open(server_name, address, port, credentials.unwrap_or_default()) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.set_state(SessionState::Connected);
                info!(server = %server_name, address = %address, port, "Connected");
                Ok(())
            }
            Err(e) => {
                warn!(server = %server_name, address = %address, port, error = %e, "Connect failed");
                self.set_state(SessionState::Disconnected);
                Err(e)
            }
        }
    }

    fn open(
        &self,
        server_name: &str,
        address: &str,
        port: u16,
        credentials: Credentials,
    ) -> Result<Box<dyn ProtocolSession>, ConnectionError> {
        let timed_out = || ConnectionError::Timeout {
            address: address.to_string(),
            port,
            timeout: self.timeout,
        };

        let started = Instant::now();
        let mut handle = self
            .connector
            .connect(server_name, address, port, self.timeout)
            .map_err(|e| match e {
                ProtocolError::Timeout(_) => timed_out(),
                source => ConnectionError::Unreachable {
                    address: address.to_string(),
                    port,
                    source,
                },
            })?;

        handle
            .authenticate(
                &credentials.username,
                &credentials.password,
                &credentials.domain,
            )
            .map_err(|e| match e {
                ProtocolError::Timeout(_) => timed_out(),
                ProtocolError::AuthenticationFailed(_) => ConnectionError::AuthenticationFailed {
                    user: credentials.username.clone(),
                    source: e,
                },
                source => ConnectionError::Unreachable {
                    address: address.to_string(),
                    port,
                    source,
                },
            })?;

        if started.elapsed() > self.timeout {
            if let Err(e) = handle.logoff() {
                debug!(error = %e, "Logoff of late session failed");
            }
            return Err(timed_out());
        }

        Ok(handle)
    }

    /// Log off and return to `Disconnected`. Safe to call in any state.
    pub fn disconnect(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            match handle.logoff() {
                Ok(()) => info!("Logged off"),
                Err(e) => warn!(error = %e, "Logoff failed, dropping session anyway"),
            }
        }
        if let Some(session) = self.session.as_mut() {
            session.current_share = None;
        }
        self.set_state(SessionState::Disconnected);
    }

    /// Mark `share` as the current share of the live session.
    pub(crate) fn set_current_share(&mut self, share: &str) {
        if self.handle.is_none() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.current_share = Some(share.to_string());
        }
        self.set_state(SessionState::ShareSelected);
    }

    /// Run `op` against the live handle.
    ///
    /// Returns `None` when no session is open. A fatal protocol failure
    /// drops the handle and moves the session to `Disconnected`.
    pub fn with_session<T, E, F>(&mut self, op: F) -> Option<Result<T, E>>
    where
        E: ProtocolFailure,
        F: FnOnce(&mut dyn ProtocolSession) -> Result<T, E>,
    {
        let handle = self.handle.as_mut()?;
        let result = op(handle.as_mut());

        let fatal = match &result {
            Err(e) => e.protocol_error().filter(|p| p.is_fatal()).map(|p| p.to_string()),
            Ok(_) => None,
        };
        if let Some(reason) = fatal {
            warn!(reason = %reason, "Connection lost, session dropped");
            self.abandon();
        }

        Some(result)
    }

    /// Drop the handle without logging off and return to `Disconnected`.
    ///
    /// For handles whose state can no longer be trusted.
    pub(crate) fn abandon(&mut self) {
        self.handle = None;
        if let Some(session) = self.session.as_mut() {
            session.current_share = None;
        }
        self.set_state(SessionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Call, MemoryServer};

    fn manager(server: &MemoryServer) -> ConnectionManager {
        ConnectionManager::new(Arc::new(server.clone()), Duration::from_secs(5))
    }

    #[test]
    fn test_connect_anonymous() {
        let server = MemoryServer::new().with_share("Public");
        let mut manager = manager(&server);
        let mut rx = manager.subscribe();

        manager.connect("SERVER", "10.0.0.5", 139, None).unwrap();

        assert_eq!(manager.state(), SessionState::Connected);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Connected);
        assert_eq!(manager.session().unwrap().target(), "SERVER (10.0.0.5:139)");
    }

    #[test]
    fn test_connect_refused_stays_disconnected() {
        let server = MemoryServer::new().refusing_connections("port closed");
        let mut manager = manager(&server);

        let err = manager.connect("SERVER", "10.0.0.5", 139, None).unwrap_err();

        assert!(matches!(err, ConnectionError::Unreachable { .. }));
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_bad_credentials() {
        let server = MemoryServer::new().with_account("bob", "pw");
        let mut manager = manager(&server);

        let err = manager
            .connect("SERVER", "10.0.0.5", 139, Some(Credentials::new("bob", "wrong", "")))
            .unwrap_err();

        assert!(matches!(err, ConnectionError::AuthenticationFailed { ref user, .. } if user == "bob"));
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_timeout() {
        let server = MemoryServer::new().with_connect_latency(Duration::from_millis(200));
        let mut manager = ConnectionManager::new(Arc::new(server), Duration::from_millis(20));

        let err = manager.connect("SERVER", "10.0.0.5", 139, None).unwrap_err();

        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_empty_address_rejected() {
        let server = MemoryServer::new();
        let mut manager = manager(&server);

        let err = manager.connect("SERVER", "  ", 139, None).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidAddress(_)));
        assert!(server.journal().is_empty());
    }

    #[test]
    fn test_second_connect_rejected() {
        let server = MemoryServer::new();
        let mut manager = manager(&server);
        manager.connect("SERVER", "10.0.0.5", 139, None).unwrap();

        let err = manager.connect("OTHER", "10.0.0.6", 139, None).unwrap_err();

        assert!(matches!(err, ConnectionError::AlreadyConnected(_)));
        assert_eq!(manager.state(), SessionState::Connected);
        assert_eq!(manager.session().unwrap().server_name, "SERVER");
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let server = MemoryServer::new().with_share("Public");
        let mut manager = manager(&server);
        manager.connect("SERVER", "10.0.0.5", 139, None).unwrap();
        manager.set_current_share("Public");
        assert_eq!(manager.current_share(), Some("Public"));

        manager.disconnect();
        manager.disconnect();

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(manager.current_share(), None);
        let logoffs = server
            .journal()
            .into_iter()
            .filter(|c| *c == Call::Logoff)
            .count();
        assert_eq!(logoffs, 1);
    }

    #[test]
    fn test_disconnect_survives_failed_logoff() {
        let server = MemoryServer::new();
        let mut manager = manager(&server);
        manager.connect("SERVER", "10.0.0.5", 139, None).unwrap();
        server.sever();

        manager.disconnect();

        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_fatal_error_drops_session() {
        let server = MemoryServer::new().with_share("Public");
        let mut manager = manager(&server);
        manager.connect("SERVER", "10.0.0.5", 139, None).unwrap();
        server.sever();

        let result = manager.with_session(|s| s.connect_tree("Public"));

        assert!(matches!(result, Some(Err(ProtocolError::ConnectionClosed(_)))));
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(manager.with_session(|s| s.list_shares()).is_none());
    }

    #[test]
    fn test_non_fatal_error_keeps_session() {
        let server = MemoryServer::new();
        let mut manager = manager(&server);
        manager.connect("SERVER", "10.0.0.5", 139, None).unwrap();

        let result = manager.with_session(|s| s.connect_tree("Missing"));

        assert!(matches!(result, Some(Err(ProtocolError::BadNetworkName(_)))));
        assert_eq!(manager.state(), SessionState::Connected);
    }

    #[test]
    fn test_share_selection_requires_session() {
        let server = MemoryServer::new();
        let mut manager = manager(&server);

        manager.set_current_share("Public");

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(manager.current_share(), None);
    }
}
