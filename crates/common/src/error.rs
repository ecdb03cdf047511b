//! Error types shared across CastBridge crates.

/// Top-level error type for CastBridge operations.
#[derive(Debug, thiserror::Error)]
pub enum CastError {
    /// The user declined capture consent. Terminal for the start attempt.
    #[error("Capture consent was denied")]
    ConsentDenied,

    /// Consent had not resolved when the upgrade retries were cancelled.
    #[error("Privilege temporarily unavailable")]
    PrivilegeTemporarilyUnavailable,

    /// Not even bridge privilege could be obtained from the host.
    #[error("Bridge privilege unavailable: {message}")]
    BridgeUnavailable { message: String },

    /// Frame delivery is not possible right now; the frame is dropped.
    #[error("Frame channel unavailable: {message}")]
    ChannelUnavailable { message: String },

    /// A frame header or body did not match its declared length.
    #[error("Protocol violation: expected {expected} bytes, received {received}")]
    ProtocolViolation { expected: usize, received: usize },

    /// A second session was requested while one is still live.
    #[error("A capture session is already active")]
    SessionAlreadyActive,

    /// The session was stopped while the request was still in flight.
    #[error("Capture session was stopped")]
    SessionStopped,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CastError.
pub type CastResult<T> = Result<T, CastError>;

impl CastError {
    pub fn bridge_unavailable(msg: impl Into<String>) -> Self {
        Self::BridgeUnavailable {
            message: msg.into(),
        }
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelUnavailable {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn protocol(expected: usize, received: usize) -> Self {
        Self::ProtocolViolation { expected, received }
    }

    /// Whether the error reports an upgrade that was cut short rather than refused.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PrivilegeTemporarilyUnavailable)
    }
}
