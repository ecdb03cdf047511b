//! Session timing.
//!
//! Each capture session is anchored to a monotonic instant recorded when
//! the session is created, paired with the wall-clock time at that moment
//! for display and for stamping termination signals.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// A clock anchored to the start of one capture session.
#[derive(Debug, Clone)]
pub struct SessionClock {
    /// The instant the session was created.
    epoch: Instant,

    /// Wall-clock time at epoch.
    epoch_wall: DateTime<Utc>,
}

impl SessionClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
        }
    }

    /// Time since the session was created.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Seconds since the session was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at session start.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.epoch_wall
    }

    /// Wall-clock time at session start as RFC 3339.
    pub fn started_at_rfc3339(&self) -> String {
        self.epoch_wall.to_rfc3339()
    }
}

/// Current wall-clock time, used to stamp signals.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
