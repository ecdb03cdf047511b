//! CastBridge platform core contracts.
//!
//! The operating system is never modelled directly. Instead, this crate
//! describes the capabilities the bridge needs from it (privilege grants,
//! capture-sample delivery, virtual display notifications) as traits, so
//! the session and capture crates can be driven by a real host or by a
//! test double without caring which.
//!
//! Termination signals live here too: they are the messages every
//! context (UI, display notifications, the frame channel) sends to the
//! coordinator when it sees a session end.

pub mod display;
pub mod privilege;
pub mod sample;
pub mod signal;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use display::*;
pub use privilege::*;
pub use sample::*;
pub use signal::*;

/// Opaque identity of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Mint a fresh session id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OS-sanctioned capability level of a running capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeKind {
    /// Long-running host process allowed without prior consent.
    Bridge,
    /// Full capture privilege, requires user consent.
    Full,
}

impl fmt::Display for PrivilegeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivilegeKind::Bridge => f.write_str("bridge"),
            PrivilegeKind::Full => f.write_str("full"),
        }
    }
}
