use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use intercom_api::SwitchStatus;

use super::capability::RelayCapability;

/// Live state of one relay as last reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayState {
    pub id: u32,
    pub active: bool,
    pub locked: bool,
    pub held: bool,
}

impl From<SwitchStatus> for RelayState {
    fn from(s: SwitchStatus) -> Self {
        Self {
            id: s.switch,
            active: s.active,
            locked: s.locked,
            held: s.held,
        }
    }
}

/// A relay as the host sees it: capability, last known state, availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayEntity {
    pub id: u32,
    pub capability: RelayCapability,
    /// `None` until the first successful poll or switch event.
    pub state: Option<RelayState>,
    /// `false` after too many consecutive failed polls.
    pub available: bool,
}

impl RelayEntity {
    pub fn is_on(&self) -> Option<bool> {
        self.state.map(|s| s.active)
    }
}

/// Snapshot of every relay, keyed by relay id.
pub type RelayTable = Arc<BTreeMap<u32, RelayEntity>>;
