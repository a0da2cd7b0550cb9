//! Session management module.
//!
//! This module owns the one network session a controller talks through:
//! its lifecycle states, the credentials it was opened with, and the
//! connection manager that holds the protocol handle.

pub mod manager;
pub mod state;

pub use manager::{ConnectionManager, DEFAULT_TIMEOUT};
pub use state::{Credentials, Session, SessionState};
