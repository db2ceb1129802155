use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

use super::event::DeviceEvent;

/// Self-resetting sensors driven by one-shot events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PulseKind {
    /// Request-to-exit button pressed.
    Rex,
    SilentAlarm,
    /// A card, code, or mobile key was rejected.
    InvalidCredential,
}

/// State of one pulse sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseSensorState {
    pub active: bool,
    /// When the sensor reverts to off. `None` while inactive.
    pub armed_until: Option<Instant>,
    /// Id of the event that last triggered the sensor.
    pub last_event_id: Option<u64>,
}

/// Call progress derived from `CallStateChanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallActivity {
    /// Device call state; `terminated` is reported as `idle`.
    pub state: String,
    pub direction: Option<String>,
    pub peer: Option<String>,
    pub session: Option<u64>,
    pub call: Option<u64>,
}

impl Default for CallActivity {
    fn default() -> Self {
        Self {
            state: "idle".into(),
            direction: None,
            peer: None,
            session: None,
            call: None,
        }
    }
}

/// Event-derived sensor values. `None` means no event seen yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub motion: Option<bool>,
    pub noise: Option<bool>,
    pub door_open: Option<bool>,
    pub call: CallActivity,
    /// Most recent event of any type, overwritten on every event.
    pub last_event: Option<Arc<DeviceEvent>>,
    /// Cleared while the event channel keeps failing.
    pub available: bool,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            motion: None,
            noise: None,
            door_open: None,
            call: CallActivity::default(),
            last_event: None,
            available: true,
        }
    }
}
