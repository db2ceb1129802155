// ── Event dispatcher ──
//
// Maps each device event to its entity updates through a fixed routing
// table. Dispatch never fails: unknown event types only refresh the
// last-event sensor, malformed parameters are skipped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

use crate::model::{CallActivity, DeviceEvent, EventKind, PulseKind};
use crate::poll::PollRequest;
use crate::pulse::PulseSensors;
use crate::store::StateStore;

/// Event re-published to session listeners (automations, `watch` CLI).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
    /// Published type; rejected credentials get an `Invalid` suffix.
    pub event_type: String,
    /// Type as reported by the device.
    pub original_event: String,
    pub device_id: Option<String>,
    pub id: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub up_time: Option<i64>,
    pub params: Map<String, Value>,
}

/// What an event kind updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Motion,
    Noise,
    Door,
    Call,
    Switch,
    Pulse(PulseKind),
    Credential,
    Ignore,
}

fn route(kind: &EventKind) -> Route {
    match kind {
        EventKind::MotionDetected => Route::Motion,
        EventKind::NoiseDetected => Route::Noise,
        EventKind::DoorStateChanged => Route::Door,
        EventKind::CallStateChanged => Route::Call,
        EventKind::SwitchStateChanged => Route::Switch,
        EventKind::RexActivated => Route::Pulse(PulseKind::Rex),
        EventKind::SilentAlarm => Route::Pulse(PulseKind::SilentAlarm),
        EventKind::CardEntered | EventKind::CodeEntered | EventKind::MobKeyEntered => {
            Route::Credential
        }
        EventKind::Unknown(_) => Route::Ignore,
    }
}

pub(crate) struct EventDispatcher {
    store: Arc<StateStore>,
    pulses: Arc<PulseSensors>,
    bus: broadcast::Sender<Arc<BusEvent>>,
    relay_updates: mpsc::Sender<PollRequest>,
    device_id: Option<String>,
}

impl EventDispatcher {
    pub(crate) fn new(
        store: Arc<StateStore>,
        pulses: Arc<PulseSensors>,
        bus: broadcast::Sender<Arc<BusEvent>>,
        relay_updates: mpsc::Sender<PollRequest>,
        device_id: Option<String>,
    ) -> Self {
        Self {
            store,
            pulses,
            bus,
            relay_updates,
            device_id,
        }
    }

    /// Apply one event to entity state.
    pub(crate) fn dispatch(&self, event: DeviceEvent) {
        let event = Arc::new(event);
        trace!(event = %event.kind, id = ?event.id, "dispatch");

        let route = route(&event.kind);
        let mut publish_as = Some(event.kind.to_string());

        self.store.sensors.send_modify(|s| {
            match route {
                Route::Motion => s.motion = Some(is_state(&event, &["in"])),
                Route::Noise => s.noise = Some(is_state(&event, &["in"])),
                Route::Door => s.door_open = Some(is_state(&event, &["opened", "open"])),
                Route::Call => s.call = call_activity(&event),
                _ => {}
            }
            s.last_event = Some(Arc::clone(&event));
        });

        match route {
            Route::Switch => self.forward_switch(&event),
            Route::Pulse(kind) => {
                self.pulses.get(kind).trigger(event.id);
            }
            Route::Credential => {
                if event.valid() == Some(false) {
                    self.pulses.get(PulseKind::InvalidCredential).trigger(event.id);
                    publish_as = Some(format!("{}Invalid", event.kind));
                } else {
                    publish_as = None;
                }
            }
            Route::Ignore => {
                debug!(event = %event.kind, "ignoring unmodelled event type");
                publish_as = None;
            }
            Route::Motion | Route::Noise | Route::Door | Route::Call => {}
        }

        if let Some(event_type) = publish_as {
            // No receivers is fine.
            let _ = self.bus.send(Arc::new(BusEvent {
                event_type,
                original_event: event.kind.to_string(),
                device_id: self.device_id.clone(),
                id: event.id,
                timestamp: event.timestamp,
                up_time: event.up_time,
                params: event.params.clone(),
            }));
        }
    }

    /// Relay state from an event is applied by the poll coordinator, which
    /// owns the relay table.
    fn forward_switch(&self, event: &DeviceEvent) {
        let (Some(relay), Some(active)) = (event.param_u64("switch"), event.param_bool("state"))
        else {
            debug!(params = ?event.params, "SwitchStateChanged without usable switch/state");
            return;
        };
        let Ok(relay) = u32::try_from(relay) else {
            return;
        };
        if let Err(e) = self
            .relay_updates
            .try_send(PollRequest::SwitchChanged { relay, active })
        {
            warn!(relay, error = %e, "dropping relay update from event");
        }
    }
}

fn is_state(event: &DeviceEvent, on_values: &[&str]) -> bool {
    event
        .param_str("state")
        .is_some_and(|s| on_values.contains(&s.as_str()))
}

fn call_activity(event: &DeviceEvent) -> CallActivity {
    let state = match event.param_str("state").as_deref() {
        None | Some("" | "terminated") => "idle".to_owned(),
        Some(other) => other.to_owned(),
    };
    let text = |name: &str| {
        event
            .params
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
    };
    CallActivity {
        state,
        direction: text("direction"),
        peer: text("peer"),
        session: event.param_u64("session"),
        call: event.param_u64("call"),
    }
}
