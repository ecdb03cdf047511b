//! Escalation retry timing.

use std::time::Duration;

use castbridge_common::config::RetryConfig;
use castbridge_platform_core::PrivilegeError;

/// How long to wait before the next escalation attempt.
///
/// There is no attempt limit: consent latency is up to the user, so only a
/// stop or a successful escalation ends the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// After the host refused for lack of consent.
    pub denied_delay: Duration,
    /// After an unexpected failure, to stay out of a hot loop.
    pub error_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            denied_delay: config.denied_delay(),
            error_delay: config.error_delay(),
        }
    }

    /// `None` means the failure is terminal for the session.
    pub fn delay_after(&self, error: &PrivilegeError) -> Option<Duration> {
        match error {
            PrivilegeError::Denied => Some(self.denied_delay),
            PrivilegeError::Failed { .. } => Some(self.error_delay),
            PrivilegeError::ConsentRefused => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
