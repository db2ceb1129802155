//! Relay state and actuation.

use std::time::Duration;

use tabled::Tabled;
use tracing::debug;

use intercom_core::{DeviceSession, RelayEntity, RelayTable, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct RelayRow {
    #[tabled(rename = "Relay")]
    id: u32,
    #[tabled(rename = "Mode")]
    mode: &'static str,
    #[tabled(rename = "Enabled")]
    enabled: &'static str,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Locked")]
    locked: String,
    #[tabled(rename = "Held")]
    held: String,
    #[tabled(rename = "Available")]
    available: &'static str,
}

fn row(r: &RelayEntity, color: bool) -> RelayRow {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    RelayRow {
        id: r.id,
        mode: if r.capability.monostable {
            "monostable"
        } else {
            "bistable"
        },
        enabled: yes_no(r.capability.enabled),
        state: output::on_off(r.is_on(), color),
        locked: output::on_off(r.state.map(|s| s.locked), color),
        held: output::on_off(r.state.map(|s| s.held), color),
        available: yes_no(r.available),
    }
}

/// Wait up to `wait` for every enabled relay to have a polled state.
async fn settled_relays(session: &DeviceSession, wait: Duration) -> RelayTable {
    let mut rx = session.watch_relays();
    let settled = matches!(
        tokio::time::timeout(
            wait,
            rx.wait_for(|table| {
                table
                    .values()
                    .all(|r| !r.capability.enabled || r.state.is_some())
            }),
        )
        .await,
        Ok(Ok(_))
    );
    if !settled {
        debug!("relay status incomplete, showing last known state");
    }
    session.relays()
}

pub async fn list(config: SessionConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let wait = config.timeout;
    let table =
        DeviceSession::oneshot(config, |session| async move {
            Ok(settled_relays(&session, wait).await)
        })
        .await?;
    let relays: Vec<RelayEntity> = table.values().cloned().collect();

    let color = output::should_color(&global.color);
    let out = output::render_list(&global.output, &relays, |r| row(r, color), |r| {
        r.id.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn trigger(config: SessionConfig, relay: u32, global: &GlobalOpts) -> Result<(), CliError> {
    DeviceSession::oneshot(config, |session| async move { session.trigger(relay).await }).await?;
    if !global.quiet {
        eprintln!("Relay {relay} triggered");
    }
    Ok(())
}

pub async fn door_release(config: SessionConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let relay = config.door_release_switch;
    DeviceSession::oneshot(config, |session| async move { session.door_release().await }).await?;
    if !global.quiet {
        eprintln!("Door released (relay {relay})");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::commands::testing::{config, global, mount_device, ok};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer};

    #[tokio::test]
    async fn door_release_fires_the_configured_relay_once() {
        let server = MockServer::start().await;
        mount_device(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/switch/ctrl"))
            .and(query_param("switch", "1"))
            .and(query_param("action", "trigger"))
            .respond_with(ok(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        door_release(config(&server), &global(OutputFormat::Table))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn trigger_of_unknown_relay_is_not_found() {
        let server = MockServer::start().await;
        mount_device(&server).await;

        let err = trigger(config(&server), 7, &global(OutputFormat::Table))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::RelayNotFound { relay: 7 }));
        assert_eq!(err.exit_code(), crate::error::exit_code::NOT_FOUND);
    }

    #[tokio::test]
    async fn relay_list_waits_for_first_poll() {
        let server = MockServer::start().await;
        mount_device(&server).await;

        let table = DeviceSession::oneshot(config(&server), |session| async move {
            Ok(settled_relays(&session, Duration::from_secs(2)).await)
        })
        .await
        .unwrap();
        let relay = &table[&1];
        assert_eq!(relay.is_on(), Some(false));
        assert!(relay.available);
    }
}
