//! Virtual display lifecycle notifications.

use serde::{Deserialize, Serialize};

/// Power state reported for a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Unknown,
    Off,
    On,
    Doze,
}

impl DisplayState {
    /// Map the host's integer display state.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Off,
            2 => Self::On,
            3 | 4 => Self::Doze,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of a display as carried by a change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: i32,
    pub name: String,
    pub state: DisplayState,
}

/// Display lifecycle callbacks the host invokes.
pub trait DisplayListener: Send + Sync {
    fn on_display_added(&self, _display_id: i32) {}

    fn on_display_changed(&self, display: &DisplayInfo);

    fn on_display_removed(&self, display_id: i32);
}
