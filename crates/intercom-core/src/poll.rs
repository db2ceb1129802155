// ── Poll coordinator ──
//
// Owns the relay table. A single task polls `/api/switch/status` on a
// fixed interval and applies relay changes forwarded by the dispatcher or
// requested after a trigger. Because the task awaits each poll before
// selecting again, at most one status request is in flight and ticks that
// come due meanwhile are skipped, not queued.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use intercom_api::{DeviceClient, SwitchStatus};

use crate::config::PollConfig;
use crate::error::CoreError;
use crate::model::RelayState;
use crate::store::StateStore;

pub(crate) const POLL_CHANNEL_SIZE: usize = 64;

/// Work handed to the poll coordinator from other components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollRequest {
    /// Poll now instead of waiting for the next tick.
    Refresh,
    /// A `SwitchStateChanged` event reported a new relay state.
    SwitchChanged { relay: u32, active: bool },
}

pub(crate) struct PollCoordinator {
    client: Arc<DeviceClient>,
    store: Arc<StateStore>,
    config: PollConfig,
    /// Relays enabled on the device; only these are polled and updated.
    enabled: Vec<u32>,
    consecutive_failures: u32,
}

impl PollCoordinator {
    pub(crate) fn new(
        client: Arc<DeviceClient>,
        store: Arc<StateStore>,
        config: PollConfig,
        enabled: Vec<u32>,
    ) -> Self {
        Self {
            client,
            store,
            config,
            enabled,
            consecutive_failures: 0,
        }
    }

    /// Run one status poll and apply the result.
    ///
    /// A failure keeps the previous relay states (stale read) and only marks
    /// relays unavailable once `unavailable_after` polls failed in a row.
    pub(crate) async fn tick(&mut self) -> Result<(), CoreError> {
        if self.enabled.is_empty() {
            return Ok(());
        }

        match self.client.get_switch_status().await {
            Ok(statuses) => {
                if self.consecutive_failures >= self.config.unavailable_after {
                    info!(
                        failures = self.consecutive_failures,
                        "relay status recovered"
                    );
                }
                self.consecutive_failures = 0;
                self.apply_statuses(&statuses);
                Ok(())
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                debug!(
                    error = %e,
                    failures = self.consecutive_failures,
                    "relay status poll failed, keeping last known state"
                );
                if self.consecutive_failures == self.config.unavailable_after {
                    warn!(
                        failures = self.consecutive_failures,
                        "relay status unavailable"
                    );
                    self.set_available(false);
                }
                Err(e.into())
            }
        }
    }

    fn apply_statuses(&self, statuses: &[SwitchStatus]) {
        let enabled = &self.enabled;
        self.store.relays.send_if_modified(|table| {
            let mut changed = false;
            let relays = Arc::make_mut(table);
            for status in statuses {
                if !enabled.contains(&status.switch) {
                    continue;
                }
                let Some(entity) = relays.get_mut(&status.switch) else {
                    continue;
                };
                let state = Some(RelayState::from(*status));
                if entity.state != state || !entity.available {
                    entity.state = state;
                    entity.available = true;
                    changed = true;
                }
            }
            changed
        });
    }

    fn set_available(&self, available: bool) {
        let enabled = &self.enabled;
        self.store.relays.send_if_modified(|table| {
            let mut changed = false;
            let relays = Arc::make_mut(table);
            for id in enabled {
                if let Some(entity) = relays.get_mut(id) {
                    changed |= entity.available != available;
                    entity.available = available;
                }
            }
            changed
        });
    }

    /// Apply a relay change reported by an event, keeping the other fields.
    pub(crate) fn apply_event(&self, relay: u32, active: bool) {
        let updated = self.store.relays.send_if_modified(|table| {
            let Some(entity) = table.get(&relay) else {
                return false;
            };
            if entity.state.is_some_and(|s| s.active == active) {
                return false;
            }
            let relays = Arc::make_mut(table);
            if let Some(entity) = relays.get_mut(&relay) {
                let mut state = entity.state.unwrap_or(RelayState {
                    id: relay,
                    ..RelayState::default()
                });
                state.active = active;
                entity.state = Some(state);
            }
            true
        });
        if updated {
            debug!(relay, active, "relay state from event");
        }
    }

    /// Poll loop. Exits promptly on cancellation, even mid-request.
    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::Receiver<PollRequest>,
        cancel: CancellationToken,
    ) {
        let polling = !self.enabled.is_empty();
        if !polling {
            debug!("no enabled relays, status polling disabled");
        }

        let mut interval = tokio::time::interval(self.config.relay_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(PollRequest::SwitchChanged { relay, active }) => {
                        self.apply_event(relay, active);
                    }
                    Some(PollRequest::Refresh) => {
                        let coalesced = self.drain_refreshes(&mut requests);
                        if coalesced > 0 {
                            debug!(coalesced, "merged queued relay refresh requests");
                        }
                        if !self.tick_or_cancel(&cancel).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = interval.tick(), if polling => {
                    if !self.tick_or_cancel(&cancel).await {
                        break;
                    }
                }
            }
        }
        debug!("relay poll loop exiting");
    }

    /// Take every request already queued. Switch changes are applied,
    /// extra refreshes are dropped in favour of the poll about to run.
    /// Returns how many refreshes were dropped.
    fn drain_refreshes(&mut self, requests: &mut mpsc::Receiver<PollRequest>) -> usize {
        let mut dropped = 0;
        while let Ok(request) = requests.try_recv() {
            match request {
                PollRequest::Refresh => dropped += 1,
                PollRequest::SwitchChanged { relay, active } => self.apply_event(relay, active),
            }
        }
        dropped
    }

    /// Returns `false` if cancelled while the poll was in flight.
    async fn tick_or_cancel(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            // Failures are absorbed; `tick` already logged them.
            _ = self.tick() => true,
        }
    }
}
