// ── Pulse sensors ──
//
// Boolean sensors that turn on when a qualifying event arrives and turn
// themselves off after a fixed dwell. Triggering updates the state
// immediately; a per-sensor timer task performs the expiry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PulseConfig;
use crate::model::{PulseKind, PulseSensorState};

pub struct PulseSensor {
    kind: PulseKind,
    dwell: Duration,
    state: Arc<watch::Sender<PulseSensorState>>,
    deadlines: mpsc::UnboundedSender<Instant>,
}

impl PulseSensor {
    /// Create the sensor and spawn its expiry timer.
    pub(crate) fn spawn(
        kind: PulseKind,
        dwell: Duration,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (state, _) = watch::channel(PulseSensorState::default());
        let state = Arc::new(state);
        let (deadlines, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(expiry_task(kind, Arc::clone(&state), rx, cancel));
        (
            Self {
                kind,
                dwell,
                state,
                deadlines,
            },
            handle,
        )
    }

    /// Turn the sensor on (or extend its window) for an event.
    ///
    /// Returns `false` while the sensor is still on from the same
    /// `event_id`, so a replayed event cannot extend the pulse. Once the
    /// pulse has expired any id fires again; device ids restart on reboot.
    pub(crate) fn trigger(&self, event_id: Option<u64>) -> bool {
        let until = Instant::now() + self.dwell;
        let fired = self.state.send_if_modified(|s| {
            if s.active && event_id.is_some() && s.last_event_id == event_id {
                return false;
            }
            s.active = true;
            s.armed_until = Some(until);
            s.last_event_id = event_id;
            true
        });
        if fired {
            debug!(sensor = %self.kind, dwell = ?self.dwell, "pulse on");
            // The timer only stops after cancellation, when expiry no longer matters.
            let _ = self.deadlines.send(until);
        }
        fired
    }

    pub fn state(&self) -> PulseSensorState {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    pub fn subscribe(&self) -> watch::Receiver<PulseSensorState> {
        self.state.subscribe()
    }
}

async fn expiry_task(
    kind: PulseKind,
    state: Arc<watch::Sender<PulseSensorState>>,
    mut deadlines: mpsc::UnboundedReceiver<Instant>,
    cancel: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = deadlines.recv() => match next {
                Some(at) => deadline = Some(at),
                None => break,
            },
            () = sleep_until(deadline) => {
                deadline = None;
                let now = Instant::now();
                let expired = state.send_if_modified(|s| {
                    if s.active && s.armed_until.is_some_and(|t| t <= now) {
                        s.active = false;
                        s.armed_until = None;
                        true
                    } else {
                        false
                    }
                });
                if expired {
                    debug!(sensor = %kind, "pulse off");
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// The three pulse sensors of a session.
pub struct PulseSensors {
    rex: PulseSensor,
    silent_alarm: PulseSensor,
    invalid_credential: PulseSensor,
}

impl PulseSensors {
    pub(crate) fn spawn(
        config: &PulseConfig,
        cancel: &CancellationToken,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Self {
        let mut make = |kind, dwell| {
            let (sensor, handle) = PulseSensor::spawn(kind, dwell, cancel.child_token());
            handles.push(handle);
            sensor
        };
        Self {
            rex: make(PulseKind::Rex, config.rex),
            silent_alarm: make(PulseKind::SilentAlarm, config.silent_alarm),
            invalid_credential: make(PulseKind::InvalidCredential, config.invalid_credential),
        }
    }

    pub fn get(&self, kind: PulseKind) -> &PulseSensor {
        match kind {
            PulseKind::Rex => &self.rex,
            PulseKind::SilentAlarm => &self.silent_alarm,
            PulseKind::InvalidCredential => &self.invalid_credential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DWELL: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn turns_off_after_dwell_without_input() {
        let cancel = CancellationToken::new();
        let (sensor, handle) = PulseSensor::spawn(PulseKind::Rex, DWELL, cancel.clone());

        assert!(!sensor.is_active());
        assert!(sensor.trigger(Some(1)));
        assert!(sensor.is_active());

        tokio::time::sleep(DWELL - Duration::from_millis(10)).await;
        assert!(sensor.is_active());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sensor.is_active());
        assert_eq!(sensor.state().armed_until, None);

        cancel.cancel();
        handle.await.ok();
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_extends_window() {
        let cancel = CancellationToken::new();
        let (sensor, _handle) = PulseSensor::spawn(PulseKind::SilentAlarm, DWELL, cancel.clone());

        sensor.trigger(Some(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        sensor.trigger(Some(2));

        // Past the first window, inside the second.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(sensor.is_active());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!sensor.is_active());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_event_id_is_ignored() {
        let cancel = CancellationToken::new();
        let (sensor, _handle) =
            PulseSensor::spawn(PulseKind::InvalidCredential, DWELL, cancel.clone());

        assert!(sensor.trigger(Some(7)));
        let first = sensor.state().armed_until;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!sensor.trigger(Some(7)));
        assert_eq!(sensor.state().armed_until, first);

        // Events without an id are never deduplicated.
        assert!(sensor.trigger(None));
        assert!(sensor.trigger(None));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn same_event_id_fires_again_after_expiry() {
        let cancel = CancellationToken::new();
        let (sensor, _handle) = PulseSensor::spawn(PulseKind::Rex, DWELL, cancel.clone());

        assert!(sensor.trigger(Some(3)));
        tokio::time::sleep(DWELL + Duration::from_millis(10)).await;
        assert!(!sensor.is_active());

        // The device rebooted and its event ids started over.
        assert!(sensor.trigger(Some(3)));
        assert!(sensor.is_active());
        cancel.cancel();
    }
}
