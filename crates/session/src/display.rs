//! Virtual display notifications as termination signals.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use castbridge_common::config::DisplayConfig;
use castbridge_platform_core::{
    DisplayInfo, DisplayListener, DisplayState, SessionId, TerminationSignal, TerminationSource,
};

#[derive(Debug, Clone, Copy)]
struct DisplayRecord {
    is_capture: bool,
    session: Option<SessionId>,
}

/// Watches host display notifications for the end of the capture display.
///
/// A capture display turning off and any display being removed are both
/// reported; they may arrive in either order, or only one of them. A
/// removal is skipped only for a display that was seen under a name that
/// is clearly not a capture display.
///
/// With a session feed attached, a display belongs to the session that was
/// live when it was first seen, and its signals name that session.
pub struct VirtualDisplayMonitor {
    markers: Vec<String>,
    signals: mpsc::UnboundedSender<TerminationSignal>,
    session_feed: Option<watch::Receiver<Option<SessionId>>>,
    known: Mutex<HashMap<i32, DisplayRecord>>,
}

impl VirtualDisplayMonitor {
    pub fn new(config: &DisplayConfig, signals: mpsc::UnboundedSender<TerminationSignal>) -> Self {
        Self {
            markers: config.virtual_display_markers.clone(),
            signals,
            session_feed: None,
            known: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_session_feed(mut self, feed: watch::Receiver<Option<SessionId>>) -> Self {
        self.session_feed = Some(feed);
        self
    }

    /// Whether a display name identifies a capture display.
    pub fn is_capture_display(&self, name: &str) -> bool {
        self.markers.iter().any(|marker| name.contains(marker.as_str()))
    }

    fn live_session(&self) -> Option<SessionId> {
        self.session_feed.as_ref().and_then(|feed| *feed.borrow())
    }

    fn emit(&self, source: TerminationSource, display_id: i32, session: Option<SessionId>) {
        let signal = match (&self.session_feed, session) {
            (None, _) => TerminationSignal::now(source),
            (Some(_), Some(session)) => TerminationSignal::for_session(source, session),
            (Some(_), None) => {
                tracing::debug!(display_id, ?source, "Display ended with no session live");
                return;
            }
        };
        tracing::info!(
            display_id,
            ?source,
            session = ?signal.session,
            "Virtual display ended capture"
        );
        if self.signals.send(signal).is_err() {
            tracing::debug!("Coordinator gone; display signal dropped");
        }
    }

    fn known(&self) -> std::sync::MutexGuard<'_, HashMap<i32, DisplayRecord>> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a sighting, keeping the session the display was first seen in.
    fn record(&self, display_id: i32, is_capture: bool) -> DisplayRecord {
        let live = self.live_session();
        let mut known = self.known();
        let record = known.entry(display_id).or_insert(DisplayRecord {
            is_capture,
            session: live,
        });
        record.is_capture = is_capture;
        if record.session.is_none() {
            record.session = live;
        }
        *record
    }
}

impl DisplayListener for VirtualDisplayMonitor {
    fn on_display_added(&self, display_id: i32) {
        // Unnamed until the first change; a capture display until proven otherwise.
        let record = self.record(display_id, true);
        tracing::debug!(display_id, session = ?record.session, "Display added");
    }

    fn on_display_changed(&self, display: &DisplayInfo) {
        let is_capture = self.is_capture_display(&display.name);
        let record = self.record(display.id, is_capture);
        if is_capture && display.state == DisplayState::Off {
            self.emit(
                TerminationSource::OsVirtualDisplayStateOff,
                display.id,
                record.session,
            );
        }
    }

    fn on_display_removed(&self, display_id: i32) {
        let record = self.known().remove(&display_id);
        let record = record.unwrap_or_else(|| DisplayRecord {
            is_capture: true,
            session: self.live_session(),
        });
        if record.is_capture {
            self.emit(
                TerminationSource::OsVirtualDisplayRemoved,
                display_id,
                record.session,
            );
        } else {
            tracing::debug!(display_id, "Non-capture display removed");
        }
    }
}
