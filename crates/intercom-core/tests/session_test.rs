#![allow(clippy::unwrap_used)]
// End-to-end session tests against a wiremock device.

use std::future::Future;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::time::Instant;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use intercom_core::{
    BackoffConfig, CoreError, DeviceSession, PulseKind, SessionConfig, SubscriptionState,
};

// ── Helpers ─────────────────────────────────────────────────────────

const EVENTS: [&str; 4] = [
    "DoorStateChanged",
    "RexActivated",
    "SwitchStateChanged",
    "CardEntered",
];

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "result": result }))
}

fn invalid_subscription() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": false,
        "error": { "code": 12, "param": "id", "description": "invalid parameter value" }
    }))
}

fn empty_pull() -> ResponseTemplate {
    ok(json!({ "events": [] })).set_delay(Duration::from_millis(100))
}

/// Mount the setup endpoints: identity, relays, supported events.
async fn mount_device(server: &MockServer, switches: Value) {
    Mock::given(method("GET"))
        .and(path("/api/system/info"))
        .respond_with(ok(json!({
            "variant": "2N IP Verso",
            "serialNumber": "54-0001-0002",
            "swVersion": "2.40.0.54.2",
            "buildType": "release",
            "deviceName": "Front gate",
            "macAddr": "7C-1E-B3-00-11-22"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/switch/caps"))
        .respond_with(ok(json!({ "switches": switches })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/caps"))
        .respond_with(ok(json!({ "events": EVENTS })))
        .mount(server)
        .await;
}

fn relay_caps() -> Value {
    json!([
        { "switch": 1, "enabled": true, "mode": "monostable", "switchOnDuration": 5 },
        { "switch": 2, "enabled": false, "mode": "bistable" }
    ])
}

fn config(server: &MockServer) -> SessionConfig {
    let mut config = SessionConfig::new(Url::parse(&server.uri()).unwrap(), None);
    config.timeout = Duration::from_secs(2);
    config.events.pull_timeout = Duration::from_secs(1);
    config.events.resubscribe_delay = Duration::from_millis(20);
    config.events.backoff = BackoffConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
    };
    config.polling.relay_interval = Duration::from_millis(50);
    config
}

fn without_events(mut config: SessionConfig) -> SessionConfig {
    config.events.filter = Some(Vec::new());
    config
}

async fn requests(server: &MockServer, endpoint: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == endpoint)
        .collect()
}

fn query(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Poll `check` until it holds, failing the test after five seconds.
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ── Setup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_probes_identity_and_capabilities() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;

    let session = DeviceSession::open(without_events(config(&server)))
        .await
        .unwrap();

    assert_eq!(session.device_info().unique_id(), Some("54-0001-0002"));
    assert_eq!(session.device_info().title(), "Front gate");
    assert_eq!(session.capabilities().relays.len(), 2);
    assert!(session.event_filter().is_empty());
    assert_eq!(session.subscription_state(), SubscriptionState::Unsubscribed);

    session.close().await;
}

#[tokio::test]
async fn test_setup_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/system/info"))
        .respond_with(ok(json!({ "serialNumber": "54-0001-0002" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/switch/caps"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/caps"))
        .respond_with(ok(json!({ "events": [] })))
        .mount(&server)
        .await;

    let err = DeviceSession::open(config(&server)).await.err().unwrap();
    assert!(matches!(err, CoreError::Setup { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_rejected_credentials_fail_setup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = DeviceSession::open(config(&server)).await.err().unwrap();
    assert!(
        matches!(err, CoreError::AuthenticationFailed { .. }),
        "got {err:?}"
    );
}

// ── Event channel ───────────────────────────────────────────────────

#[tokio::test]
async fn test_door_event_turns_sensor_on_and_empty_pull_keeps_it() {
    let server = MockServer::start().await;
    mount_device(&server, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .and(query_param("include", "new"))
        .and(query_param("duration", "3600"))
        .respond_with(ok(json!({ "id": 7 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .and(query_param("id", "7"))
        .and(query_param("timeout", "1"))
        .respond_with(ok(json!({
            "events": [{
                "id": 1,
                "utcTime": 1_700_000_000,
                "upTime": 10,
                "event": "DoorStateChanged",
                "params": { "door": 1, "state": "opened" }
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .and(query_param("id", "7"))
        .respond_with(empty_pull())
        .mount(&server)
        .await;

    let session = DeviceSession::open(config(&server)).await.unwrap();
    let mut sensors = session.watch_sensors();
    tokio::time::timeout(
        Duration::from_secs(5),
        sensors.wait_for(|s| s.door_open == Some(true)),
    )
    .await
    .unwrap()
    .unwrap();

    let server_ref = &server;
    eventually("two more pulls", move || async move {
        requests(server_ref, "/api/log/pull").await.len() >= 3
    })
    .await;

    let snapshot = session.sensors();
    assert_eq!(snapshot.door_open, Some(true));
    assert_eq!(snapshot.last_event.unwrap().id, Some(1));
    assert_eq!(
        session.subscription_state(),
        SubscriptionState::Active { id: 7 }
    );

    session.close().await;
}

#[tokio::test]
async fn test_invalid_subscription_resubscribes_once_and_uses_new_id() {
    let server = MockServer::start().await;
    mount_device(&server, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .respond_with(ok(json!({ "id": 1 })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .respond_with(ok(json!({ "id": 2 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .and(query_param("id", "1"))
        .respond_with(invalid_subscription())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .and(query_param("id", "2"))
        .respond_with(empty_pull())
        .mount(&server)
        .await;

    let session = DeviceSession::open(config(&server)).await.unwrap();

    let server_ref = &server;
    eventually("a pull on the new channel", move || async move {
        requests(server_ref, "/api/log/pull")
            .await
            .iter()
            .any(|r| query(r, "id").as_deref() == Some("2"))
    })
    .await;

    let log: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| matches!(r.url.path(), "/api/log/subscribe" | "/api/log/pull"))
        .map(|r| match r.url.path() {
            "/api/log/pull" => format!("pull {}", query(r, "id").unwrap()),
            _ => "subscribe".to_owned(),
        })
        .collect();
    assert_eq!(
        &log[..4],
        &["subscribe", "pull 1", "subscribe", "pull 2"].map(str::to_owned)
    );
    assert_eq!(requests(&server, "/api/log/subscribe").await.len(), 2);
    assert_eq!(
        session.subscription_state(),
        SubscriptionState::Active { id: 2 }
    );

    session.close().await;
}

#[tokio::test]
async fn test_transient_pull_failure_keeps_channel() {
    let server = MockServer::start().await;
    mount_device(&server, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .respond_with(ok(json!({ "id": 5 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(empty_pull())
        .mount(&server)
        .await;

    let session = DeviceSession::open(config(&server)).await.unwrap();

    let server_ref = &server;
    eventually("pulls after the failures", move || async move {
        requests(server_ref, "/api/log/pull").await.len() >= 4
    })
    .await;

    assert_eq!(requests(&server, "/api/log/subscribe").await.len(), 1);
    assert!(
        requests(&server, "/api/log/pull")
            .await
            .iter()
            .all(|r| query(r, "id").as_deref() == Some("5"))
    );

    session.close().await;
}

#[tokio::test]
async fn test_pulse_event_is_published_and_expires() {
    let server = MockServer::start().await;
    mount_device(&server, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .respond_with(ok(json!({ "id": 3 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(
            ok(json!({
                "events": [
                    { "id": 10, "event": "RexActivated", "params": {} },
                    { "id": 11, "event": "CardEntered", "params": { "valid": false, "uid": "0A1B" } }
                ]
            }))
            .set_delay(Duration::from_millis(200)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(empty_pull())
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.pulses.rex = Duration::from_millis(300);
    let session = DeviceSession::open(cfg).await.unwrap();
    let mut bus = session.events();

    let first = tokio::time::timeout(Duration::from_secs(5), bus.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.event_type, "RexActivated");
    let second = bus.recv().await.unwrap();
    assert_eq!(second.event_type, "CardEnteredInvalid");
    assert_eq!(second.device_id.as_deref(), Some("54-0001-0002"));

    assert!(session.pulse(PulseKind::Rex).active);
    assert!(session.pulse(PulseKind::InvalidCredential).active);

    let mut rex = session.watch_pulse(PulseKind::Rex);
    tokio::time::timeout(Duration::from_secs(2), rex.wait_for(|s| !s.active))
        .await
        .unwrap()
        .unwrap();
    // The longer dwell is still running.
    assert!(session.pulse(PulseKind::InvalidCredential).active);

    session.close().await;
}

#[tokio::test]
async fn test_close_unsubscribes_active_channel() {
    let server = MockServer::start().await;
    mount_device(&server, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .respond_with(ok(json!({ "id": 9 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(empty_pull())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/unsubscribe"))
        .and(query_param("id", "9"))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let session = DeviceSession::open(config(&server)).await.unwrap();
    let mut state = session.watch_subscription_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == SubscriptionState::Active { id: 9 }),
    )
    .await
    .unwrap()
    .unwrap();

    session.close().await;
    assert!(session.is_closed());
    assert_eq!(session.subscription_state(), SubscriptionState::Stopped);
    assert!(matches!(
        session.trigger(1).await,
        Err(CoreError::SessionClosed)
    ));

    let pulls = requests(&server, "/api/log/pull").await.len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(requests(&server, "/api/log/pull").await.len(), pulls);

    // Closing twice is harmless.
    session.close().await;
}

// ── Relays ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disabled_relay_is_never_polled() {
    let server = MockServer::start().await;
    mount_device(
        &server,
        json!([{ "switch": 2, "enabled": false, "mode": "bistable" }]),
    )
    .await;

    let session = DeviceSession::open(without_events(config(&server)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(requests(&server, "/api/switch/status").await.is_empty());

    let relay = session.relay(2).unwrap();
    assert!(!relay.capability.enabled);
    assert_eq!(relay.state, None);

    let entity = session
        .entities()
        .into_iter()
        .find(|e| e.unique_id == "54-0001-0002_switch_2")
        .unwrap();
    assert!(!entity.enabled_by_default);

    session.close().await;
}

#[tokio::test]
async fn test_status_poll_updates_enabled_relays_only() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;
    Mock::given(method("GET"))
        .and(path("/api/switch/status"))
        .respond_with(ok(json!({
            "switches": [
                { "switch": 1, "active": true, "locked": false, "held": false },
                { "switch": 2, "active": true, "locked": false, "held": false }
            ]
        })))
        .mount(&server)
        .await;

    let session = DeviceSession::open(without_events(config(&server)))
        .await
        .unwrap();
    let mut relays = session.watch_relays();
    tokio::time::timeout(
        Duration::from_secs(5),
        relays.wait_for(|t| t[&1].state.is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(session.relay(1).unwrap().is_on(), Some(true));
    assert_eq!(session.relay(2).unwrap().state, None);

    session.close().await;
}

#[tokio::test]
async fn test_failed_poll_keeps_last_relay_state() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;
    Mock::given(method("GET"))
        .and(path("/api/switch/status"))
        .respond_with(ok(json!({
            "switches": [{ "switch": 1, "active": true, "locked": true, "held": false }]
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/switch/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut cfg = without_events(config(&server));
    cfg.polling.unavailable_after = 1000;
    let session = DeviceSession::open(cfg).await.unwrap();

    let server_ref = &server;
    eventually("a failed poll", move || async move {
        requests(server_ref, "/api/switch/status").await.len() >= 4
    })
    .await;

    let relay = session.relay(1).unwrap();
    let state = relay.state.unwrap();
    assert!(state.active);
    assert!(state.locked);
    assert!(relay.available);

    session.close().await;
}

#[tokio::test]
async fn test_relays_become_unavailable_after_repeated_failures() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;
    Mock::given(method("GET"))
        .and(path("/api/switch/status"))
        .respond_with(ok(json!({
            "switches": [{ "switch": 1, "active": false }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/switch/status"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/switch/status"))
        .respond_with(ok(json!({
            "switches": [{ "switch": 1, "active": true }]
        })))
        .mount(&server)
        .await;

    let mut cfg = without_events(config(&server));
    cfg.polling.unavailable_after = 3;
    let session = DeviceSession::open(cfg).await.unwrap();
    let mut relays = session.watch_relays();

    tokio::time::timeout(
        Duration::from_secs(5),
        relays.wait_for(|t| !t[&1].available),
    )
    .await
    .unwrap()
    .unwrap();
    // Last known value is still reported alongside the availability flag.
    assert_eq!(session.relay(1).unwrap().is_on(), Some(false));

    tokio::time::timeout(
        Duration::from_secs(5),
        relays.wait_for(|t| t[&1].available && t[&1].is_on() == Some(true)),
    )
    .await
    .unwrap()
    .unwrap();

    session.close().await;
}

#[tokio::test]
async fn test_event_sensors_become_unavailable_while_pulls_fail() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;

    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .respond_with(ok(json!({ "id": 6 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(ok(json!({
            "events": [{ "id": 1, "event": "DoorStateChanged", "params": { "state": "opened" } }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(empty_pull())
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.events.unavailable_after = 3;
    cfg.polling.relay_interval = Duration::from_secs(3600);
    let session = DeviceSession::open(cfg).await.unwrap();
    let mut sensors = session.watch_sensors();

    tokio::time::timeout(Duration::from_secs(5), sensors.wait_for(|s| !s.available))
        .await
        .unwrap()
        .unwrap();
    // The last door state is kept alongside the flag.
    assert_eq!(session.sensors().door_open, Some(true));
    assert_eq!(
        session.subscription_state(),
        SubscriptionState::Active { id: 6 }
    );

    tokio::time::timeout(Duration::from_secs(5), sensors.wait_for(|s| s.available))
        .await
        .unwrap()
        .unwrap();

    session.close().await;
}

#[tokio::test]
async fn test_switch_event_updates_relay() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;

    Mock::given(method("GET"))
        .and(path("/api/log/subscribe"))
        .respond_with(ok(json!({ "id": 4 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(ok(json!({
            "events": [{ "id": 1, "event": "SwitchStateChanged", "params": { "switch": 1, "state": true } }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/log/pull"))
        .respond_with(empty_pull())
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    // Keep the status poll out of the way.
    cfg.polling.relay_interval = Duration::from_secs(3600);
    let session = DeviceSession::open(cfg).await.unwrap();
    let mut relays = session.watch_relays();

    tokio::time::timeout(
        Duration::from_secs(5),
        relays.wait_for(|t| t[&1].is_on() == Some(true)),
    )
    .await
    .unwrap()
    .unwrap();

    session.close().await;
}

#[tokio::test]
async fn test_trigger_is_not_retried_on_timeout() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;
    Mock::given(method("GET"))
        .and(path("/api/switch/ctrl"))
        .and(query_param("switch", "1"))
        .and(query_param("action", "trigger"))
        .respond_with(ok(json!({})).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = without_events(config(&server));
    cfg.timeout = Duration::from_millis(300);
    let session = DeviceSession::open(cfg).await.unwrap();

    let err = session.trigger(1).await.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { .. }), "got {err:?}");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(requests(&server, "/api/switch/ctrl").await.len(), 1);

    session.close().await;
}

#[tokio::test]
async fn test_trigger_unknown_relay_and_device_error() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;
    Mock::given(method("GET"))
        .and(path("/api/switch/ctrl"))
        .and(query_param("switch", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": { "code": 14, "param": "switch", "description": "switch disabled" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = DeviceSession::open(without_events(config(&server)))
        .await
        .unwrap();

    assert!(matches!(
        session.trigger(7).await,
        Err(CoreError::RelayNotFound { relay: 7 })
    ));
    assert!(matches!(
        session.trigger(2).await,
        Err(CoreError::Device { code: 14, .. })
    ));

    session.close().await;
}

#[tokio::test]
async fn test_door_release_triggers_configured_relay() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;
    Mock::given(method("GET"))
        .and(path("/api/switch/ctrl"))
        .and(query_param("switch", "1"))
        .and(query_param("action", "trigger"))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    DeviceSession::oneshot(config(&server), |session| async move {
        session.door_release().await
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_status_polls_never_touch_pulse_sensors() {
    let server = MockServer::start().await;
    mount_device(&server, relay_caps()).await;
    Mock::given(method("GET"))
        .and(path("/api/switch/status"))
        .respond_with(ok(json!({
            "switches": [{ "switch": 1, "active": true }]
        })))
        .mount(&server)
        .await;

    let session = DeviceSession::open(without_events(config(&server)))
        .await
        .unwrap();
    let watchers: Vec<_> = [
        PulseKind::Rex,
        PulseKind::SilentAlarm,
        PulseKind::InvalidCredential,
    ]
    .into_iter()
    .map(|kind| session.watch_pulse(kind))
    .collect();

    let server_ref = &server;
    eventually("several status polls", move || async move {
        requests(server_ref, "/api/switch/status").await.len() >= 4
    })
    .await;

    for watcher in &watchers {
        assert!(!watcher.has_changed().unwrap());
        assert!(!watcher.borrow().active);
    }

    session.close().await;
}
