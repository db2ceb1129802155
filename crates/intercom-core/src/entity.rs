// ── Entity descriptors ──
//
// The entities a host should create for one device. Derived once from the
// device identity and capability set; the host decides how to render them.

use serde::Serialize;

use crate::model::{CapabilitySet, DeviceInfo, EventKind, PulseKind};

/// Host platform an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    Switch,
    BinarySensor,
    Sensor,
    Button,
    Camera,
}

/// Which session value backs an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntitySource {
    Relay(u32),
    Motion,
    Noise,
    Door,
    Pulse(PulseKind),
    CallActivity,
    LastEvent,
    DoorRelease,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescriptor {
    /// Stable across restarts: `{device}_{key}`.
    pub unique_id: String,
    pub platform: Platform,
    pub name: String,
    pub source: EntitySource,
    pub enabled_by_default: bool,
    /// State is inferred from commands rather than observed.
    pub assumed_state: bool,
}

/// Describe every entity for the device.
///
/// Everything is created; capabilities decide only `enabled_by_default`.
/// A device without a serial or MAC gets the `2n` prefix.
pub fn describe(info: &DeviceInfo, caps: &CapabilitySet) -> Vec<EntityDescriptor> {
    let device = info.unique_id().unwrap_or("2n");
    let entity = |key: &str, platform: Platform, name: &str, source: EntitySource, enabled: bool| {
        EntityDescriptor {
            unique_id: format!("{device}_{key}"),
            platform,
            name: name.to_owned(),
            source,
            enabled_by_default: enabled,
            assumed_state: false,
        }
    };
    let supports = |kind: EventKind| caps.supports_event(kind.as_str());

    let mut out: Vec<EntityDescriptor> = caps
        .relays
        .iter()
        .map(|(id, cap)| EntityDescriptor {
            assumed_state: cap.monostable,
            ..entity(
                &format!("switch_{id}"),
                Platform::Switch,
                &format!("Relay {id}"),
                EntitySource::Relay(*id),
                cap.enabled,
            )
        })
        .collect();

    out.extend([
        entity(
            "motion",
            Platform::BinarySensor,
            "Motion",
            EntitySource::Motion,
            supports(EventKind::MotionDetected),
        ),
        entity(
            "noise",
            Platform::BinarySensor,
            "Noise",
            EntitySource::Noise,
            supports(EventKind::NoiseDetected),
        ),
        entity(
            "door",
            Platform::BinarySensor,
            "Door",
            EntitySource::Door,
            supports(EventKind::DoorStateChanged),
        ),
        entity(
            "invalid_credential",
            Platform::BinarySensor,
            "Invalid credential",
            EntitySource::Pulse(PulseKind::InvalidCredential),
            supports(EventKind::CardEntered)
                || supports(EventKind::CodeEntered)
                || supports(EventKind::MobKeyEntered),
        ),
        entity(
            "rex",
            Platform::BinarySensor,
            "Request to exit",
            EntitySource::Pulse(PulseKind::Rex),
            supports(EventKind::RexActivated),
        ),
        entity(
            "silent_alarm",
            Platform::BinarySensor,
            "Silent alarm",
            EntitySource::Pulse(PulseKind::SilentAlarm),
            supports(EventKind::SilentAlarm),
        ),
        entity(
            "activity",
            Platform::Sensor,
            "Call activity",
            EntitySource::CallActivity,
            supports(EventKind::CallStateChanged),
        ),
        entity(
            "last_event",
            Platform::Sensor,
            "Last event",
            EntitySource::LastEvent,
            true,
        ),
        entity(
            "door_release",
            Platform::Button,
            "Door release",
            EntitySource::DoorRelease,
            true,
        ),
        entity(
            "snapshot",
            Platform::Camera,
            info.title(),
            EntitySource::Snapshot,
            true,
        ),
    ]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercom_api::SwitchCapability;
    use pretty_assertions::assert_eq;

    fn info() -> DeviceInfo {
        DeviceInfo {
            name: Some("Front gate".into()),
            serial: Some("54-0001-0002".into()),
            ..DeviceInfo::default()
        }
    }

    fn switch(id: u32, enabled: bool, mode: &str) -> SwitchCapability {
        SwitchCapability {
            switch: id,
            enabled,
            mode: Some(mode.into()),
            switch_on_duration: None,
            kind: None,
        }
    }

    fn find<'a>(entities: &'a [EntityDescriptor], unique_id: &str) -> &'a EntityDescriptor {
        entities
            .iter()
            .find(|e| e.unique_id == unique_id)
            .unwrap_or_else(|| panic!("no entity {unique_id}"))
    }

    #[test]
    fn disabled_relay_is_created_but_disabled_by_default() {
        let caps = CapabilitySet::new(
            &[switch(1, true, "monostable"), switch(2, false, "bistable")],
            vec![],
        );
        let entities = describe(&info(), &caps);

        let relay1 = find(&entities, "54-0001-0002_switch_1");
        assert!(relay1.enabled_by_default);
        assert!(relay1.assumed_state);

        let relay2 = find(&entities, "54-0001-0002_switch_2");
        assert_eq!(relay2.source, EntitySource::Relay(2));
        assert!(!relay2.enabled_by_default);
        assert!(!relay2.assumed_state);
    }

    #[test]
    fn unsupported_events_disable_their_sensors() {
        let caps = CapabilitySet::new(
            &[],
            vec!["DoorStateChanged".into(), "CodeEntered".into()],
        );
        let entities = describe(&info(), &caps);

        assert!(find(&entities, "54-0001-0002_door").enabled_by_default);
        assert!(find(&entities, "54-0001-0002_invalid_credential").enabled_by_default);
        assert!(!find(&entities, "54-0001-0002_motion").enabled_by_default);
        assert!(!find(&entities, "54-0001-0002_silent_alarm").enabled_by_default);
        assert!(find(&entities, "54-0001-0002_last_event").enabled_by_default);
        assert_eq!(find(&entities, "54-0001-0002_snapshot").name, "Front gate");
    }

    #[test]
    fn empty_log_caps_enable_everything() {
        let entities = describe(&DeviceInfo::default(), &CapabilitySet::default());
        assert!(entities.iter().all(|e| e.enabled_by_default));
        assert!(entities.iter().all(|e| e.unique_id.starts_with("2n_")));
        assert_eq!(entities.len(), 10);
    }
}
