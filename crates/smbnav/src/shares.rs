//! Share discovery and selection.
//!
//! Servers that refuse enumeration (or only return administrative shares)
//! are probed with a list of common share names instead. The probe is a
//! tree connect followed by a tree disconnect; it only tells the user where
//! to look and grants nothing.

use protocol::{ProtocolError, ProtocolSession};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ShareAccessError;
use crate::session::ConnectionManager;

/// Share names probed when enumeration gives nothing usable.
pub const DEFAULT_CANDIDATE_SHARES: &[&str] =
    &["shared", "Public", "Files", "Data", "Share", "Documents", "Temp"];

/// A share as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareDescriptor {
    pub name: String,
    pub is_administrative: bool,
}

impl ShareDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_administrative = name.ends_with('$');
        Self {
            name,
            is_administrative,
        }
    }
}

/// Clean up a raw share name: drop the wire terminator and padding.
fn clean_name(raw: &str) -> &str {
    raw.trim_end_matches('\0').trim()
}

fn probe(session: &mut dyn ProtocolSession, share: &str) -> Result<(), ProtocolError> {
    let tree = session.connect_tree(share)?;
    session.disconnect_tree(tree)
}

/// Discovers and selects shares on the connected session.
#[derive(Debug, Clone)]
pub struct ShareResolver {
    candidates: Vec<String>,
}

impl Default for ShareResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATE_SHARES.iter().map(|s| s.to_string()).collect())
    }
}

impl ShareResolver {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// User-visible shares of the connected server.
    ///
    /// Empty when not connected.
    pub fn list_shares(&self, manager: &mut ConnectionManager) -> Vec<ShareDescriptor> {
        if !manager.state().is_connected() {
            debug!("Share listing skipped: not connected");
            return Vec::new();
        }

        match manager.with_session(|s| s.list_shares()) {
            None => return Vec::new(),
            Some(Ok(raw)) => {
                let shares: Vec<ShareDescriptor> = raw
                    .iter()
                    .map(|info| clean_name(&info.name))
                    .filter(|name| !name.is_empty())
                    .map(ShareDescriptor::new)
                    .filter(|share| !share.is_administrative)
                    .collect();
                if !shares.is_empty() {
                    info!(count = shares.len(), "Enumerated shares");
                    return shares;
                }
                info!("Enumeration returned no user shares, probing candidates");
            }
            Some(Err(e)) => {
                warn!(error = %e, "Share enumeration failed, probing candidates");
            }
        }

        self.probe_candidates(manager)
    }

    fn probe_candidates(&self, manager: &mut ConnectionManager) -> Vec<ShareDescriptor> {
        let mut found = Vec::new();

        for candidate in &self.candidates {
            let share = ShareDescriptor::new(candidate.trim());
            if share.name.is_empty() || share.is_administrative {
                continue;
            }

            match manager.with_session(|s| probe(s, &share.name)) {
                None => break,
                Some(Ok(())) => {
                    debug!(share = %share.name, "Candidate share reachable");
                    found.push(share);
                }
                Some(Err(e)) => {
                    debug!(share = %share.name, error = %e, "Candidate share unreachable");
                }
            }
        }

        info!(count = found.len(), "Share probe finished");
        found
    }

    /// Make `name` the current share after checking it can be opened.
    ///
    /// On failure the previous share and state are kept.
    pub fn select_share(
        &self,
        manager: &mut ConnectionManager,
        name: &str,
    ) -> Result<(), ShareAccessError> {
        let name = clean_name(name);
        if !manager.state().is_connected() {
            return Err(ShareAccessError::NotConnected);
        }
        if name.is_empty() {
            return Err(ShareAccessError::NoSuchShare(name.to_string()));
        }

        let result = manager
            .with_session(|s| probe(s, name))
            .ok_or(ShareAccessError::NotConnected)?;

        match result {
            Ok(()) => {
                manager.set_current_share(name);
                info!(share = %name, "Share selected");
                Ok(())
            }
            Err(e) => {
                warn!(share = %name, error = %e, "Share selection failed");
                Err(match e {
                    ProtocolError::BadNetworkName(_) => {
                        ShareAccessError::NoSuchShare(name.to_string())
                    }
                    ProtocolError::AccessDenied(_) => ShareAccessError::AccessDenied {
                        share: name.to_string(),
                        source: e,
                    },
                    source => ShareAccessError::Protocol {
                        share: name.to_string(),
                        source,
                    },
                })
            }
        }
    }
}
