//! Termination signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SessionId;

/// What observed the end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationSource {
    /// Explicit stop from the user or the app shell.
    UserStop,
    /// The OS removed the virtual capture display.
    OsVirtualDisplayRemoved,
    /// The virtual capture display reported its state as off.
    OsVirtualDisplayStateOff,
    /// The producer closed the frame channel.
    ChannelClosed,
    /// The user refused consent while the session was waiting for it.
    ConsentDenied,
}

/// An assertion that a capture session has ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationSignal {
    pub source: TerminationSource,
    /// Target session; `None` means whichever session is current.
    pub session: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
}

impl TerminationSignal {
    /// A signal for the current session, stamped now.
    pub fn now(source: TerminationSource) -> Self {
        Self {
            source,
            session: None,
            timestamp: Utc::now(),
        }
    }

    /// A signal for a specific session, stamped now.
    pub fn for_session(source: TerminationSource, session: SessionId) -> Self {
        Self {
            source,
            session: Some(session),
            timestamp: Utc::now(),
        }
    }
}
