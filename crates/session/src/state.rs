//! Capture session model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use castbridge_common::clock::SessionClock;
use castbridge_platform_core::{PrivilegeKind, SessionId};

/// Where a session stands with the user's consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    Unrequested,
    Pending,
    Granted,
    Denied,
}

/// Coordinator lifecycle, as exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Requesting,
    BridgePrivilege,
    UpgradePolling,
    FullPrivilege,
    Stopping,
    Denied,
}

impl LifecycleState {
    /// The only privilege kind a session may hold in this state.
    pub fn privilege_kind(self) -> Option<PrivilegeKind> {
        match self {
            Self::BridgePrivilege | Self::UpgradePolling => Some(PrivilegeKind::Bridge),
            Self::FullPrivilege => Some(PrivilegeKind::Full),
            Self::Idle | Self::Requesting | Self::Stopping | Self::Denied => None,
        }
    }

    /// Whether the host currently runs a session in this state.
    pub fn is_live(self) -> bool {
        self.privilege_kind().is_some()
    }
}

/// Returned to the caller of `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub requested_kind: PrivilegeKind,
    pub correlation_token: Option<String>,
}

impl SessionHandle {
    /// Text for the ongoing-session status indicator.
    pub fn status_line(&self) -> String {
        match &self.correlation_token {
            Some(token) => format!("Broadcasting \u{2022} Code: {token}"),
            None => "Broadcasting your screen".to_string(),
        }
    }
}

/// The live session record owned by the coordinator.
#[derive(Debug, Clone)]
pub(crate) struct CaptureSession {
    pub session_id: SessionId,
    pub requested_kind: PrivilegeKind,
    pub current_kind: Option<PrivilegeKind>,
    pub consent: ConsentState,
    pub correlation_token: Option<String>,
    pub clock: SessionClock,
}

impl CaptureSession {
    pub fn new(requested_kind: PrivilegeKind, correlation_token: Option<String>) -> Self {
        Self {
            session_id: SessionId::new(),
            requested_kind,
            current_kind: None,
            consent: ConsentState::Unrequested,
            correlation_token,
            clock: SessionClock::start(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.session_id,
            requested_kind: self.requested_kind,
            correlation_token: self.correlation_token.clone(),
        }
    }

    pub fn snapshot(&self, lifecycle: LifecycleState) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            requested_kind: self.requested_kind,
            current_kind: self.current_kind,
            consent: self.consent,
            lifecycle,
            correlation_token: self.correlation_token.clone(),
            elapsed: self.clock.elapsed(),
        }
    }
}

/// Read-only view of the live session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub requested_kind: PrivilegeKind,
    pub current_kind: Option<PrivilegeKind>,
    pub consent: ConsentState,
    pub lifecycle: LifecycleState,
    pub correlation_token: Option<String>,
    pub elapsed: Duration,
}
