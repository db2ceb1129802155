use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use intercom_api::SwitchCapability;

/// Static description of one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayCapability {
    pub enabled: bool,
    /// Auto-reverts after `switch_on_duration`; state is assumed, not observed.
    pub monostable: bool,
    pub switch_on_duration: Option<u32>,
}

/// What this device supports, fetched once at setup and never refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    pub relays: BTreeMap<u32, RelayCapability>,
    /// Event types from `/api/log/caps`. Empty when the device listed none.
    pub events: BTreeSet<String>,
}

impl CapabilitySet {
    pub fn new(switches: &[SwitchCapability], events: Vec<String>) -> Self {
        let relays = switches
            .iter()
            .map(|s| {
                let monostable = s
                    .mode
                    .as_deref()
                    .is_some_and(|m| m.eq_ignore_ascii_case("monostable"));
                (
                    s.switch,
                    RelayCapability {
                        enabled: s.enabled,
                        monostable,
                        switch_on_duration: s.switch_on_duration,
                    },
                )
            })
            .collect();
        Self {
            relays,
            events: events.into_iter().collect(),
        }
    }

    /// Whether the device reports `event`. An empty event list means the
    /// device did not say, so everything is assumed supported.
    pub fn supports_event(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.contains(event)
    }

    /// Relay ids enabled on the device, in ascending order.
    pub fn enabled_relays(&self) -> impl Iterator<Item = u32> + '_ {
        self.relays
            .iter()
            .filter(|(_, cap)| cap.enabled)
            .map(|(id, _)| *id)
    }

    /// Intersect a desired subscription filter with the supported events.
    pub fn event_filter<S: AsRef<str>>(&self, wanted: &[S]) -> Vec<String> {
        wanted
            .iter()
            .map(AsRef::as_ref)
            .filter(|e| self.supports_event(e))
            .map(str::to_owned)
            .collect()
    }
}
