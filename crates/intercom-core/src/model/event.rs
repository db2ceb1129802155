// ── Device events ──
//
// Log records from the device, converted into a closed set of known kinds
// plus an `Unknown` variant so newer firmware never breaks dispatch.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use intercom_api::LogEvent;

/// Events subscribed to unless the configuration overrides the filter.
pub const DEFAULT_EVENT_FILTER: [&str; 10] = [
    "CallStateChanged",
    "MotionDetected",
    "DoorStateChanged",
    "SwitchStateChanged",
    "RexActivated",
    "NoiseDetected",
    "SilentAlarm",
    "CardEntered",
    "CodeEntered",
    "MobKeyEntered",
];

/// Event type as reported in the `event` field of a log record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString, strum::AsRefStr)]
pub enum EventKind {
    CallStateChanged,
    MotionDetected,
    DoorStateChanged,
    SwitchStateChanged,
    RexActivated,
    NoiseDetected,
    SilentAlarm,
    CardEntered,
    CodeEntered,
    MobKeyEntered,
    /// Anything this crate does not model yet.
    #[strum(default)]
    Unknown(String),
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        name.parse()
            .unwrap_or_else(|_| EventKind::Unknown(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown(name) => name,
            known => known.as_ref(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One event from the device log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEvent {
    /// Device-assigned sequence number, used to deduplicate pulses.
    pub id: Option<u64>,
    pub kind: EventKind,
    pub timestamp: Option<DateTime<Utc>>,
    /// Seconds since device boot.
    pub up_time: Option<i64>,
    pub params: Map<String, Value>,
}

impl DeviceEvent {
    /// String parameter, lowercased and trimmed. Numbers are stringified.
    pub fn param_str(&self, name: &str) -> Option<String> {
        match self.params.get(name)? {
            Value::String(s) => Some(s.trim().to_lowercase()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer parameter; accepts numbers and numeric strings.
    pub fn param_u64(&self, name: &str) -> Option<u64> {
        match self.params.get(name)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean parameter with the device's loose encodings.
    pub fn param_bool(&self, name: &str) -> Option<bool> {
        to_bool(self.params.get(name)?)
    }

    /// `valid` flag of credential events.
    pub fn valid(&self) -> Option<bool> {
        self.param_bool("valid")
    }
}

impl From<LogEvent> for DeviceEvent {
    fn from(event: LogEvent) -> Self {
        let params = match event.params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: event.id,
            kind: EventKind::parse(&event.event),
            timestamp: event
                .utc_time
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            up_time: event.up_time,
            params,
        }
    }
}

/// Interpret `true`/`1`/`yes`/`on` (and their negatives) as booleans.
pub fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n
            .as_i64()
            .map(|i| i != 0)
            .or_else(|| n.as_f64().map(|f| f.abs() > f64::EPSILON)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
