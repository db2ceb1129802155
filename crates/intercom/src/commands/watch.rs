//! Live event and state watcher.
//!
//! Opens a full session (event channel included) and prints bus events,
//! relay changes, event-driven sensor state, pulse sensors turning on and
//! off, and subscription state until Ctrl-C or `--duration`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::warn;

use intercom_core::{
    BusEvent, CallActivity, DeviceSession, PulseKind, PulseSensorState, RelayEntity, RelayTable,
    SensorSnapshot, SessionConfig, SubscriptionState,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One line of watch output.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Event(&'a BusEvent),
    Relay(&'a RelayEntity),
    Sensors(&'a SensorView),
    Pulse { sensor: PulseKind, active: bool },
    Subscription(SubscriptionState),
}

/// Rendered sensor entities. The last event is left out; it is printed
/// as its own record.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct SensorView {
    available: bool,
    door_open: Option<bool>,
    motion: Option<bool>,
    noise: Option<bool>,
    call: CallActivity,
}

impl From<&SensorSnapshot> for SensorView {
    fn from(s: &SensorSnapshot) -> Self {
        Self {
            available: s.available,
            door_open: s.door_open,
            motion: s.motion,
            noise: s.noise,
            call: s.call.clone(),
        }
    }
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn print(&self, record: &Record<'_>) -> Result<(), CliError> {
        let line = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(record)?,
            OutputFormat::Yaml => format!("---\n{}", output::render_yaml(record)?.trim_end()),
            OutputFormat::Table => self.text(record),
            OutputFormat::Plain => plain(record),
        };
        output::print_output(&line, self.quiet);
        Ok(())
    }

    fn text(&self, record: &Record<'_>) -> String {
        match record {
            Record::Event(ev) => {
                let params = ev
                    .params
                    .iter()
                    .map(|(k, v)| format!("{k}={}", param_text(v)))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!(
                    "{} {} {params}",
                    clock(ev.timestamp),
                    output::accent(&ev.event_type, self.color)
                )
                .trim_end()
                .to_owned()
            }
            Record::Relay(r) => format!(
                "{} relay {} {}{}",
                clock(None),
                r.id,
                output::on_off(r.is_on(), self.color),
                if r.available { "" } else { " (unavailable)" }
            ),
            Record::Sensors(view) => format!(
                "{} sensors door={} motion={} noise={} call={}{}",
                clock(None),
                open_closed(view.door_open),
                output::on_off(view.motion, self.color),
                output::on_off(view.noise, self.color),
                view.call.state,
                if view.available { "" } else { " (unavailable)" }
            ),
            Record::Pulse { sensor, active } => format!(
                "{} {} {}",
                clock(None),
                output::accent(&sensor.to_string(), self.color),
                output::on_off(Some(*active), self.color)
            ),
            Record::Subscription(state) => format!("{} subscription {state}", clock(None)),
        }
    }
}

fn plain(record: &Record<'_>) -> String {
    match record {
        Record::Event(ev) => ev.event_type.clone(),
        Record::Relay(r) => format!("relay {} {}", r.id, output::on_off(r.is_on(), false)),
        Record::Sensors(view) => format!(
            "sensors door={} motion={} noise={} call={}",
            open_closed(view.door_open),
            output::on_off(view.motion, false),
            output::on_off(view.noise, false),
            view.call.state
        ),
        Record::Pulse { sensor, active } => {
            format!("{sensor} {}", output::on_off(Some(*active), false))
        }
        Record::Subscription(state) => format!("subscription {state}"),
    }
}

fn open_closed(door_open: Option<bool>) -> &'static str {
    match door_open {
        Some(true) => "open",
        Some(false) => "closed",
        None => "-",
    }
}

/// Wait for a pulse sensor change. `None` once the session is gone.
async fn pulse_changed(rx: &mut watch::Receiver<PulseSensorState>) -> Option<bool> {
    rx.changed().await.ok()?;
    Some(rx.borrow_and_update().active)
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clock(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(Local::now, |t| t.with_timezone(&Local))
        .format("%H:%M:%S")
        .to_string()
}

/// Relays whose state or availability differs from `before`.
fn changed_relays<'a>(before: &RelayTable, after: &'a RelayTable) -> Vec<&'a RelayEntity> {
    after
        .iter()
        .filter(|(id, relay)| {
            before
                .get(id)
                .is_none_or(|old| old.state != relay.state || old.available != relay.available)
        })
        .map(|(_, relay)| relay)
        .collect()
}

fn wanted(types: &[String], ev: &BusEvent) -> bool {
    types.is_empty()
        || types
            .iter()
            .any(|t| t == &ev.event_type || t == &ev.original_event)
}

pub async fn handle(
    config: SessionConfig,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = DeviceSession::open(config).await?;
    let result = watch(&session, args, global).await;
    session.close().await;
    result
}

async fn watch(session: &DeviceSession, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let printer = Printer {
        format: global.output.clone(),
        color: output::should_color(&global.color),
        quiet: global.quiet,
    };

    if session.event_filter().is_empty() {
        warn!("device offers no subscribable events, showing relay changes only");
    }

    let mut events = session.events();
    let mut relays = session.watch_relays();
    let mut subscription = session.watch_subscription_state();
    let mut sensors = session.watch_sensors();
    let mut rex = session.watch_pulse(PulseKind::Rex);
    let mut silent_alarm = session.watch_pulse(PulseKind::SilentAlarm);
    let mut invalid_credential = session.watch_pulse(PulseKind::InvalidCredential);
    let mut last_relays: RelayTable = Arc::clone(&relays.borrow_and_update());
    let mut last_sensors = SensorView::from(&*sensors.borrow_and_update());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            () = &mut deadline => break,
            received = events.recv() => match received {
                Ok(ev) => {
                    if wanted(&args.types, &ev) {
                        printer.print(&Record::Event(&ev))?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "watcher fell behind, events dropped"),
                Err(RecvError::Closed) => break,
            },
            changed = relays.changed() => {
                if changed.is_err() {
                    break;
                }
                let table = Arc::clone(&relays.borrow_and_update());
                for relay in changed_relays(&last_relays, &table) {
                    printer.print(&Record::Relay(relay))?;
                }
                last_relays = table;
            }
            changed = sensors.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = SensorView::from(&*sensors.borrow_and_update());
                // Every event touches the snapshot; print entity changes only.
                if view != last_sensors {
                    printer.print(&Record::Sensors(&view))?;
                    last_sensors = view;
                }
            }
            active = pulse_changed(&mut rex) => match active {
                Some(active) => printer.print(&Record::Pulse { sensor: PulseKind::Rex, active })?,
                None => break,
            },
            active = pulse_changed(&mut silent_alarm) => match active {
                Some(active) => printer.print(&Record::Pulse { sensor: PulseKind::SilentAlarm, active })?,
                None => break,
            },
            active = pulse_changed(&mut invalid_credential) => match active {
                Some(active) => printer.print(&Record::Pulse { sensor: PulseKind::InvalidCredential, active })?,
                None => break,
            },
            changed = subscription.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *subscription.borrow_and_update();
                printer.print(&Record::Subscription(state))?;
                if state == SubscriptionState::Failed {
                    return Err(CliError::AuthFailed {
                        message: "the device rejected the event subscription".into(),
                    });
                }
            }
        }
    }
    Ok(())
}
