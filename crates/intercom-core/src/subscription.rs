// ── Subscription manager ──
//
// The event channel lifecycle as an explicit state machine plus the task
// that drives it. The machine is pure: it decides what to do next and how
// long to wait, the driver performs the calls and feeds back outcomes.
//
//   Unsubscribed ─▶ Subscribing ─▶ Active ─▶ Invalidated ─▶ Subscribing …
//        ▲              │   (transient pull failures stay Active)
//        └── failure ───┘
//
// `Stopped` is terminal on teardown, `Failed` on rejected credentials.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use intercom_api::DeviceClient;

use crate::config::{BackoffConfig, EventConfig};
use crate::dispatch::EventDispatcher;
use crate::error::CoreError;
use crate::model::DeviceEvent;
use crate::store::StateStore;

// ── State machine ────────────────────────────────────────────────────

/// Lifecycle state of the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubscriptionState {
    Unsubscribed,
    /// A subscribe call is in flight.
    Subscribing,
    /// Pulling from channel `id`.
    Active { id: u64 },
    /// The device dropped the channel; a resubscribe is due.
    Invalidated,
    Stopped,
    /// Credentials were rejected. Needs operator action.
    Failed,
}

impl SubscriptionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsubscribed => f.write_str("unsubscribed"),
            Self::Subscribing => f.write_str("subscribing"),
            Self::Active { id } => write!(f, "active (channel {id})"),
            Self::Invalidated => f.write_str("invalidated"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Wait `delay`, then open a channel.
    Subscribe { delay: Duration },
    /// Wait `delay`, then long-poll channel `id`.
    Pull { id: u64, delay: Duration },
    /// A subscribe call is outstanding; feed its outcome first.
    AwaitSubscription,
    Halt,
}

/// Result of the call the driver just made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Subscribed(u64),
    SubscribeFailed,
    /// A pull returned, with or without events.
    Pulled,
    /// Timeout, connection reset, server error, malformed body.
    PullFailed,
    /// The device no longer knows the channel id.
    Invalidated,
    /// Credentials rejected.
    Rejected,
    Stop,
}

#[derive(Debug, Clone)]
pub struct SubscriptionMachine {
    state: SubscriptionState,
    /// Consecutive transient failures, drives the backoff.
    failures: u32,
    backoff: BackoffConfig,
    resubscribe_delay: Duration,
}

impl SubscriptionMachine {
    pub fn new(backoff: BackoffConfig, resubscribe_delay: Duration) -> Self {
        Self {
            state: SubscriptionState::Unsubscribed,
            failures: 0,
            backoff,
            resubscribe_delay,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The next action for the current state.
    pub fn next(&self) -> Command {
        let backoff = self.backoff_delay();
        match self.state {
            SubscriptionState::Unsubscribed => Command::Subscribe { delay: backoff },
            SubscriptionState::Invalidated => Command::Subscribe {
                delay: self.resubscribe_delay.max(backoff),
            },
            SubscriptionState::Subscribing => Command::AwaitSubscription,
            SubscriptionState::Active { id } => Command::Pull { id, delay: backoff },
            SubscriptionState::Stopped | SubscriptionState::Failed => Command::Halt,
        }
    }

    /// Mark a subscribe call as started.
    pub fn begin_subscribe(&mut self) {
        if matches!(
            self.state,
            SubscriptionState::Unsubscribed | SubscriptionState::Invalidated
        ) {
            self.state = SubscriptionState::Subscribing;
        }
    }

    /// Feed the outcome of the last call.
    pub fn apply(&mut self, outcome: Outcome) {
        use SubscriptionState as S;

        if self.state.is_terminal() {
            return;
        }
        self.state = match (self.state, outcome) {
            (_, Outcome::Stop) => S::Stopped,
            (_, Outcome::Rejected) => S::Failed,
            (S::Subscribing, Outcome::Subscribed(id)) => {
                self.failures = 0;
                S::Active { id }
            }
            (S::Subscribing, Outcome::SubscribeFailed) => {
                self.failures = self.failures.saturating_add(1);
                S::Unsubscribed
            }
            (active @ S::Active { .. }, Outcome::Pulled) => {
                self.failures = 0;
                active
            }
            (active @ S::Active { .. }, Outcome::PullFailed) => {
                self.failures = self.failures.saturating_add(1);
                active
            }
            (S::Active { .. }, Outcome::Invalidated) => {
                self.failures = 0;
                S::Invalidated
            }
            // Outcomes that do not fit the current state are stale; ignore.
            (state, _) => state,
        };
    }

    fn backoff_delay(&self) -> Duration {
        if self.failures == 0 {
            Duration::ZERO
        } else {
            calculate_backoff(self.failures - 1, &self.backoff)
        }
    }
}

/// Exponential backoff: `initial * 2^attempt`, capped at `max`, shortened
/// by up to a quarter with deterministic jitter so retries spread out.
pub fn calculate_backoff(attempt: u32, config: &BackoffConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 - 0.25 * (f64::from(attempt) * 7.3).sin().abs();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Driver task ──────────────────────────────────────────────────────

pub(crate) struct SubscriptionTask {
    pub(crate) client: Arc<DeviceClient>,
    pub(crate) store: Arc<StateStore>,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) filter: Vec<String>,
    pub(crate) config: EventConfig,
}

impl SubscriptionTask {
    /// Drive the machine until cancelled or credentials are rejected, then
    /// close the open channel (best effort).
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let mut machine =
            SubscriptionMachine::new(self.config.backoff, self.config.resubscribe_delay);

        loop {
            self.publish(&machine);
            match machine.next() {
                Command::Subscribe { delay } => {
                    if !sleep_or_cancel(delay, &cancel).await {
                        machine.apply(Outcome::Stop);
                        break;
                    }
                    machine.begin_subscribe();
                    self.publish(&machine);

                    let outcome = tokio::select! {
                        biased;
                        () = cancel.cancelled() => Outcome::Stop,
                        result = self.client.log_subscribe(&self.filter, self.config.subscription_duration) => {
                            match result {
                                Ok(id) => {
                                    info!(subscription = id, events = self.filter.len(), "event channel subscribed");
                                    Outcome::Subscribed(id)
                                }
                                Err(e) if e.is_auth() => {
                                    error!(error = %e, "event subscription rejected, check credentials");
                                    Outcome::Rejected
                                }
                                Err(e) => {
                                    warn!(error = %e, attempt = machine.failures() + 1, "event subscribe failed");
                                    Outcome::SubscribeFailed
                                }
                            }
                        }
                    };
                    machine.apply(outcome);
                    self.report_availability(outcome, machine.failures());
                }
                Command::Pull { id, delay } => {
                    if !delay.is_zero() {
                        debug!(subscription = id, delay = ?delay, "backing off before pull");
                    }
                    if !sleep_or_cancel(delay, &cancel).await {
                        machine.apply(Outcome::Stop);
                        break;
                    }

                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        result = self.client.log_pull(id, self.config.pull_timeout) => Some(result),
                    };
                    let outcome = match result {
                        None => Outcome::Stop,
                        Some(Ok(events)) => {
                            if !events.is_empty() {
                                debug!(subscription = id, count = events.len(), "events pulled");
                            }
                            // Device order, one at a time, before the next pull.
                            for event in events {
                                self.dispatcher.dispatch(DeviceEvent::from(event));
                            }
                            Outcome::Pulled
                        }
                        Some(Err(e)) => match CoreError::pull_failure(id, e) {
                            CoreError::SubscriptionInvalid { id } => {
                                info!(subscription = id, "event channel invalidated by device, resubscribing");
                                Outcome::Invalidated
                            }
                            CoreError::AuthenticationFailed { message } => {
                                error!(error = %message, "event pull rejected, check credentials");
                                Outcome::Rejected
                            }
                            e if e.is_transient() => {
                                debug!(subscription = id, error = %e, attempt = machine.failures() + 1, "event pull failed");
                                Outcome::PullFailed
                            }
                            e => {
                                warn!(subscription = id, error = %e, attempt = machine.failures() + 1, "event pull failed");
                                Outcome::PullFailed
                            }
                        },
                    };
                    machine.apply(outcome);
                    self.report_availability(outcome, machine.failures());
                }
                Command::AwaitSubscription => {
                    // Unreachable with a sequential driver: every subscribe
                    // call is resolved before `next` is asked again.
                    machine.apply(Outcome::SubscribeFailed);
                }
                Command::Halt => break,
            }
        }

        let last_active = match self.store.subscription_state() {
            SubscriptionState::Active { id } => Some(id),
            _ => None,
        };
        self.publish(&machine);

        if let Some(id) = last_active {
            match self.client.log_unsubscribe(id).await {
                Ok(()) => debug!(subscription = id, "event channel closed"),
                Err(e) => debug!(subscription = id, error = %e, "unsubscribe failed (ignored)"),
            }
        }
        debug!("subscription task exiting");
    }

    /// Event-driven sensors go unavailable once `unavailable_after` calls
    /// failed in a row, and come back with the next successful call.
    fn report_availability(&self, outcome: Outcome, failures: u32) {
        let available = match outcome {
            Outcome::Subscribed(_) | Outcome::Pulled => true,
            Outcome::SubscribeFailed | Outcome::PullFailed => {
                failures < self.config.unavailable_after
            }
            Outcome::Rejected => false,
            Outcome::Invalidated | Outcome::Stop => return,
        };
        self.store.sensors.send_if_modified(|s| {
            if s.available == available {
                return false;
            }
            if available {
                info!("event channel recovered, sensors available");
            } else {
                warn!(failures, "event channel failing, sensors unavailable");
            }
            s.available = available;
            true
        });
    }

    fn publish(&self, machine: &SubscriptionMachine) {
        let state = machine.state();
        self.store.subscription.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "subscription state");
            *current = state;
            true
        });
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> SubscriptionMachine {
        SubscriptionMachine::new(BackoffConfig::default(), Duration::from_secs(2))
    }

    fn activate(m: &mut SubscriptionMachine, id: u64) {
        assert_eq!(m.next(), Command::Subscribe { delay: Duration::ZERO });
        m.begin_subscribe();
        m.apply(Outcome::Subscribed(id));
    }

    #[test]
    fn starts_by_subscribing_immediately() {
        let m = machine();
        assert_eq!(m.state(), SubscriptionState::Unsubscribed);
        assert_eq!(m.next(), Command::Subscribe { delay: Duration::ZERO });
    }

    #[test]
    fn subscribed_enters_pull_loop() {
        let mut m = machine();
        activate(&mut m, 41);
        assert_eq!(m.state(), SubscriptionState::Active { id: 41 });
        assert_eq!(m.next(), Command::Pull { id: 41, delay: Duration::ZERO });

        m.apply(Outcome::Pulled);
        assert_eq!(m.next(), Command::Pull { id: 41, delay: Duration::ZERO });
    }

    #[test]
    fn invalidation_resubscribes_exactly_once_before_next_pull() {
        let mut m = machine();
        activate(&mut m, 1);

        m.apply(Outcome::Invalidated);
        assert_eq!(m.state(), SubscriptionState::Invalidated);
        assert_eq!(
            m.next(),
            Command::Subscribe {
                delay: Duration::from_secs(2)
            }
        );

        m.begin_subscribe();
        // While the subscribe call is outstanding no second one is issued.
        assert_eq!(m.next(), Command::AwaitSubscription);
        // Late pull outcomes for the old channel do not disturb it.
        m.apply(Outcome::Pulled);
        assert_eq!(m.next(), Command::AwaitSubscription);

        m.apply(Outcome::Subscribed(2));
        assert_eq!(m.next(), Command::Pull { id: 2, delay: Duration::ZERO });
    }

    #[test]
    fn transient_pull_failures_back_off_without_resubscribing() {
        let mut m = machine();
        activate(&mut m, 5);

        m.apply(Outcome::PullFailed);
        let Command::Pull { id, delay: first } = m.next() else {
            panic!("expected pull, got {:?}", m.next());
        };
        assert_eq!(id, 5);
        assert!(first > Duration::ZERO && first <= Duration::from_secs(1));

        m.apply(Outcome::PullFailed);
        m.apply(Outcome::PullFailed);
        let Command::Pull { delay: third, .. } = m.next() else {
            panic!("expected pull");
        };
        assert!(third > first);
        assert_eq!(m.state(), SubscriptionState::Active { id: 5 });

        m.apply(Outcome::Pulled);
        assert_eq!(m.next(), Command::Pull { id: 5, delay: Duration::ZERO });
    }

    #[test]
    fn failed_subscribe_retries_with_backoff() {
        let mut m = machine();
        m.begin_subscribe();
        m.apply(Outcome::SubscribeFailed);
        assert_eq!(m.state(), SubscriptionState::Unsubscribed);
        assert!(matches!(m.next(), Command::Subscribe { delay } if delay > Duration::ZERO));
    }

    #[test]
    fn stop_and_reject_are_terminal() {
        let mut m = machine();
        activate(&mut m, 3);
        m.apply(Outcome::Stop);
        assert_eq!(m.state(), SubscriptionState::Stopped);
        m.apply(Outcome::Subscribed(9));
        assert_eq!(m.next(), Command::Halt);

        let mut m = machine();
        activate(&mut m, 3);
        m.apply(Outcome::Rejected);
        assert_eq!(m.state(), SubscriptionState::Failed);
        assert_eq!(m.next(), Command::Halt);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        };
        for attempt in 0..12 {
            let delay = calculate_backoff(attempt, &config);
            let nominal = (1u64 << attempt).min(60);
            assert!(delay <= Duration::from_secs(nominal), "attempt {attempt}: {delay:?}");
            assert!(
                delay >= Duration::from_secs(nominal).mul_f64(0.75),
                "attempt {attempt}: {delay:?}"
            );
        }
        assert!(calculate_backoff(u32::MAX, &config) <= Duration::from_secs(60));
    }
}
