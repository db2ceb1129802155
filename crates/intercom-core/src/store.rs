// ── Session state store ──
//
// Snapshot storage for everything a host renders. Each value lives in a
// `watch` channel so readers always get a consistent clone and can await
// changes. Writers are fixed: relays belong to the poll coordinator,
// sensor values to the event dispatcher, the subscription state and the
// sensors' availability flag to the subscription task.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::model::{CapabilitySet, RelayEntity, RelayTable, SensorSnapshot};
use crate::subscription::SubscriptionState;

pub struct StateStore {
    pub(crate) relays: watch::Sender<RelayTable>,
    pub(crate) sensors: watch::Sender<SensorSnapshot>,
    pub(crate) subscription: watch::Sender<SubscriptionState>,
}

impl StateStore {
    /// Seed the relay table from the capability set: every relay gets an
    /// entity, none has state until the first poll or switch event.
    pub fn new(capabilities: &CapabilitySet) -> Self {
        let table: BTreeMap<u32, RelayEntity> = capabilities
            .relays
            .iter()
            .map(|(id, capability)| {
                (
                    *id,
                    RelayEntity {
                        id: *id,
                        capability: *capability,
                        state: None,
                        available: true,
                    },
                )
            })
            .collect();

        let (relays, _) = watch::channel(Arc::new(table));
        let (sensors, _) = watch::channel(SensorSnapshot::default());
        let (subscription, _) = watch::channel(SubscriptionState::Unsubscribed);

        Self {
            relays,
            sensors,
            subscription,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn relays_snapshot(&self) -> RelayTable {
        Arc::clone(&self.relays.borrow())
    }

    pub fn relay(&self, id: u32) -> Option<RelayEntity> {
        self.relays.borrow().get(&id).cloned()
    }

    pub fn sensors_snapshot(&self) -> SensorSnapshot {
        self.sensors.borrow().clone()
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        *self.subscription.borrow()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_relays(&self) -> watch::Receiver<RelayTable> {
        self.relays.subscribe()
    }

    pub fn subscribe_sensors(&self) -> watch::Receiver<SensorSnapshot> {
        self.sensors.subscribe()
    }

    pub fn subscribe_subscription_state(&self) -> watch::Receiver<SubscriptionState> {
        self.subscription.subscribe()
    }
}
