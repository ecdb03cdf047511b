//! Termination signal deduplication.
//!
//! A session can be declared over by several independent observers: the
//! user, the OS display notifications, the frame channel. They race and
//! arrive in any order. The aggregator keeps one latch per armed session
//! and lets only the first signal through.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use castbridge_platform_core::{SessionId, TerminationSignal, TerminationSource};

/// The one application-visible end of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent {
    pub session_id: SessionId,
    /// Source of the signal that won.
    pub source: TerminationSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct Latch {
    session_id: SessionId,
    stopped_by: Option<TerminationSource>,
    observed: u32,
}

/// Per-session "already stopped" latch.
#[derive(Debug, Default)]
pub struct TerminationAggregator {
    latch: Mutex<Option<Latch>>,
}

impl TerminationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new session, forgetting the previous one.
    pub fn arm(&self, session_id: SessionId) {
        *self.lock() = Some(Latch {
            session_id,
            stopped_by: None,
            observed: 0,
        });
    }

    /// Stop tracking any session.
    pub fn disarm(&self) {
        *self.lock() = None;
    }

    /// Record a signal. Returns the stop event only for the first signal of
    /// the armed session.
    pub fn observe(&self, signal: &TerminationSignal) -> Option<StopEvent> {
        let mut guard = self.lock();
        let Some(latch) = guard.as_mut() else {
            tracing::debug!(source = ?signal.source, "Termination signal with no session armed");
            return None;
        };

        if let Some(target) = signal.session {
            if target != latch.session_id {
                tracing::debug!(
                    source = ?signal.source,
                    %target,
                    "Termination signal for a stale session"
                );
                return None;
            }
        }

        latch.observed += 1;
        if let Some(first) = latch.stopped_by {
            tracing::debug!(
                source = ?signal.source,
                first = ?first,
                observed = latch.observed,
                "Duplicate termination signal ignored"
            );
            return None;
        }

        latch.stopped_by = Some(signal.source);
        tracing::info!(
            session = %latch.session_id,
            source = ?signal.source,
            "Capture session terminated"
        );
        Some(StopEvent {
            session_id: latch.session_id,
            source: signal.source,
            timestamp: signal.timestamp,
        })
    }

    /// Whether the armed session has already produced its stop event.
    pub fn is_latched(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|latch| latch.stopped_by.is_some())
    }

    pub fn armed_session(&self) -> Option<SessionId> {
        self.lock().as_ref().map(|latch| latch.session_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Latch>> {
        self.latch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
