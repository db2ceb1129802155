// Wire types for the 2N HTTP API.
//
// Every JSON endpoint wraps its payload in `{ success, result }`, or
// `{ success: false, error: { code, param, description } }` on failure.
// Fields the device may omit across firmware versions are defaulted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Envelope ────────────────────────────────────────────────────────

/// The `{ success, result | error }` response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

/// Error block of a failed envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: u32,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ── System ──────────────────────────────────────────────────────────

/// `/api/system/info` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemInfo {
    pub variant: Option<String>,
    pub serial_number: Option<String>,
    pub hw_version: Option<String>,
    pub sw_version: Option<String>,
    pub build_type: Option<String>,
    pub device_name: Option<String>,
    pub mac_addr: Option<String>,
}

// ── Switches ────────────────────────────────────────────────────────

/// `/api/switch/caps` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwitchCapsResult {
    #[serde(default)]
    pub switches: Vec<SwitchCapability>,
}

/// One relay as described by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchCapability {
    pub switch: u32,
    #[serde(default)]
    pub enabled: bool,
    /// `monostable` or `bistable`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Pulse length of a monostable switch, in seconds.
    #[serde(default)]
    pub switch_on_duration: Option<u32>,
    /// Hardware type (`normal`, `inverted`, ...).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// `/api/switch/status` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwitchStatusResult {
    #[serde(default)]
    pub switches: Vec<SwitchStatus>,
}

/// Live state of one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchStatus {
    pub switch: u32,
    pub active: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub held: bool,
}

// ── Log ─────────────────────────────────────────────────────────────

/// `/api/log/caps` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogCapsResult {
    #[serde(default)]
    pub events: Vec<String>,
}

/// `/api/log/subscribe` result.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SubscribeResult {
    pub id: u64,
}

/// `/api/log/pull` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullResult {
    #[serde(default)]
    pub events: Vec<LogEvent>,
}

/// One entry from the device event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default)]
    pub id: Option<u64>,
    /// Unix timestamp (seconds) in UTC.
    #[serde(default)]
    pub utc_time: Option<i64>,
    /// Seconds since device boot.
    #[serde(default)]
    pub up_time: Option<i64>,
    pub event: String,
    #[serde(default)]
    pub params: Value,
}

impl LogEvent {
    /// Look up a parameter by name. Non-object `params` are treated as empty.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.as_object().and_then(|map| map.get(name))
    }
}

// ── Camera ──────────────────────────────────────────────────────────

/// `/api/camera/caps` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraCapsResult {
    #[serde(default)]
    pub jpeg_resolution: Vec<Resolution>,
    #[serde(default)]
    pub sources: Vec<CameraSource>,
}

/// A snapshot resolution supported by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count, used to order resolutions.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A video source (internal or external camera).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSource {
    pub source: String,
    #[serde(default)]
    pub state: Option<String>,
}
