//! Privileged capture session capability.

use crate::{PrivilegeKind, SessionId};

/// Failure reported by the host when granting a privilege kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrivilegeError {
    /// Refused because consent has not been granted (yet).
    #[error("privilege denied by host")]
    Denied,

    /// The user explicitly refused consent.
    #[error("user refused capture consent")]
    ConsentRefused,

    /// Any other host failure.
    #[error("host failure: {message}")]
    Failed { message: String },
}

impl PrivilegeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed {
            message: msg.into(),
        }
    }
}

/// The OS privilege API as seen by the session coordinator.
///
/// Calls may take arbitrarily long; the coordinator never holds its state
/// lock across them.
#[async_trait::async_trait]
pub trait PrivilegeHost: Send + Sync {
    /// Stand up a long-running session at the given privilege kind.
    async fn acquire(
        &self,
        session: SessionId,
        kind: PrivilegeKind,
        correlation_token: Option<&str>,
    ) -> Result<(), PrivilegeError>;

    /// Re-declare an existing session at a higher privilege kind.
    async fn escalate(&self, session: SessionId, kind: PrivilegeKind) -> Result<(), PrivilegeError>;

    /// Release the session and any privilege it holds.
    ///
    /// May be called for a session whose `acquire` has not returned yet, and
    /// more than once for the same session.
    async fn release(&self, session: SessionId);
}
