// ── Device session ──
//
// Owns everything for one intercom: the HTTP client, the probed identity
// and capabilities, the state store, and the background tasks (relay
// polling, event subscription, pulse timers). Hosts read snapshots or
// watch channels and call actions; nothing here is process-global.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use intercom_api::{DeviceClient, Resolution};

use crate::config::SessionConfig;
use crate::dispatch::{BusEvent, EventDispatcher};
use crate::entity::{EntityDescriptor, describe};
use crate::error::CoreError;
use crate::media::{LiveStream, MediaProxy};
use crate::model::{
    CapabilitySet, DEFAULT_EVENT_FILTER, DeviceInfo, PulseKind, PulseSensorState, RelayEntity,
    RelayTable, SensorSnapshot,
};
use crate::poll::{POLL_CHANNEL_SIZE, PollCoordinator, PollRequest};
use crate::prober;
use crate::pulse::PulseSensors;
use crate::store::StateStore;
use crate::subscription::{SubscriptionState, SubscriptionTask};

const EVENT_CHANNEL_SIZE: usize = 256;

/// A live session with one device.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Created by
/// [`open()`](Self::open), ended by [`close()`](Self::close). Dropping the
/// last clone also stops the background tasks, without waiting for them.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    client: Arc<DeviceClient>,
    info: DeviceInfo,
    capabilities: CapabilitySet,
    /// Event types actually subscribed to. Empty disables the event channel.
    event_filter: Vec<String>,
    store: Arc<StateStore>,
    pulses: Arc<PulseSensors>,
    media: MediaProxy,
    event_tx: broadcast::Sender<Arc<BusEvent>>,
    poll_tx: mpsc::Sender<PollRequest>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl DeviceSession {
    // ── Lifecycle ────────────────────────────────────────────────────

    /// Probe the device and start the background tasks.
    ///
    /// Fails with [`CoreError::Setup`] (or [`CoreError::AuthenticationFailed`])
    /// if any probe call fails. Nothing is retried; call `open` again.
    pub async fn open(config: SessionConfig) -> Result<Self, CoreError> {
        let client = DeviceClient::new(
            config.url.clone(),
            config.credentials(),
            &config.transport(),
        )?;
        let client = Arc::new(client);

        let (info, capabilities) = prober::probe(&client).await?;
        let event_filter = match &config.events.filter {
            Some(wanted) => capabilities.event_filter(wanted.as_slice()),
            None => capabilities.event_filter(&DEFAULT_EVENT_FILTER),
        };

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        let store = Arc::new(StateStore::new(&capabilities));
        let pulses = Arc::new(PulseSensors::spawn(&config.pulses, &cancel, &mut handles));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (poll_tx, poll_rx) = mpsc::channel(POLL_CHANNEL_SIZE);

        // Relay status polling
        let enabled: Vec<u32> = capabilities.enabled_relays().collect();
        debug!(relays = ?enabled, interval = ?config.polling.relay_interval, "starting relay poll");
        let poller = PollCoordinator::new(
            Arc::clone(&client),
            Arc::clone(&store),
            config.polling,
            enabled,
        );
        handles.push(tokio::spawn(poller.run(poll_rx, cancel.child_token())));

        // Event channel
        if event_filter.is_empty() {
            info!("no subscribable events, event channel disabled");
        } else {
            let dispatcher = EventDispatcher::new(
                Arc::clone(&store),
                Arc::clone(&pulses),
                event_tx.clone(),
                poll_tx.clone(),
                info.unique_id().map(str::to_owned),
            );
            let task = SubscriptionTask {
                client: Arc::clone(&client),
                store: Arc::clone(&store),
                dispatcher,
                filter: event_filter.clone(),
                config: config.events.clone(),
            };
            handles.push(tokio::spawn(task.run(cancel.child_token())));
        }

        let media = MediaProxy::new(Arc::clone(&client), config.media, cancel.child_token());

        info!(device = info.title(), url = %config.url, "device session open");
        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                client,
                info,
                capabilities,
                event_filter,
                store,
                pulses,
                media,
                event_tx,
                poll_tx,
                cancel,
                task_handles: Mutex::new(handles),
            }),
        })
    }

    /// Stop every background task and wait for them to finish.
    ///
    /// An in-flight pull or status poll is abandoned; the event channel is
    /// then closed on the device (best effort). Safe to call more than once.
    pub async fn close(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "session task panicked");
            }
        }
        debug!("device session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// One-shot: open without the event channel, run `f`, close.
    ///
    /// For single CLI invocations that only need identity, relay state, or
    /// one action.
    pub async fn oneshot<F, Fut, T>(config: SessionConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(DeviceSession) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.events.filter = Some(Vec::new());

        let session = Self::open(cfg).await?;
        let result = f(session.clone()).await;
        session.close().await;
        result
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            Err(CoreError::SessionClosed)
        } else {
            Ok(())
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.inner.capabilities
    }

    pub fn event_filter(&self) -> &[String] {
        &self.inner.event_filter
    }

    /// Entities a host should create for this device.
    pub fn entities(&self) -> Vec<EntityDescriptor> {
        describe(&self.inner.info, &self.inner.capabilities)
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    // ── State observation ────────────────────────────────────────────

    pub fn relays(&self) -> RelayTable {
        self.inner.store.relays_snapshot()
    }

    pub fn relay(&self, id: u32) -> Option<RelayEntity> {
        self.inner.store.relay(id)
    }

    pub fn watch_relays(&self) -> watch::Receiver<RelayTable> {
        self.inner.store.subscribe_relays()
    }

    pub fn sensors(&self) -> SensorSnapshot {
        self.inner.store.sensors_snapshot()
    }

    pub fn watch_sensors(&self) -> watch::Receiver<SensorSnapshot> {
        self.inner.store.subscribe_sensors()
    }

    pub fn pulse(&self, kind: PulseKind) -> PulseSensorState {
        self.inner.pulses.get(kind).state()
    }

    pub fn watch_pulse(&self, kind: PulseKind) -> watch::Receiver<PulseSensorState> {
        self.inner.pulses.get(kind).subscribe()
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.inner.store.subscription_state()
    }

    pub fn watch_subscription_state(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.store.subscribe_subscription_state()
    }

    /// Subscribe to events re-published from the device.
    pub fn events(&self) -> broadcast::Receiver<Arc<BusEvent>> {
        self.inner.event_tx.subscribe()
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Actuate a relay once.
    ///
    /// Never retried: a timeout or device error is returned as is, even if
    /// the relay may have switched. A relay refresh is requested on success.
    pub async fn trigger(&self, relay: u32) -> Result<(), CoreError> {
        self.ensure_open()?;
        if !self.inner.capabilities.relays.contains_key(&relay) {
            return Err(CoreError::RelayNotFound { relay });
        }

        if let Err(e) = self.inner.client.trigger_switch(relay).await {
            warn!(relay, error = %e, "relay trigger failed");
            return Err(e.into());
        }
        info!(relay, "relay triggered");

        // Poll soon; the periodic tick covers it if the queue is full.
        let _ = self.inner.poll_tx.try_send(PollRequest::Refresh);
        Ok(())
    }

    /// Fire the configured door release relay.
    pub async fn door_release(&self) -> Result<(), CoreError> {
        self.trigger(self.inner.config.door_release_switch).await
    }

    /// Ask the poll coordinator for an immediate relay status poll.
    pub async fn refresh_relays(&self) -> Result<(), CoreError> {
        self.ensure_open()?;
        self.inner
            .poll_tx
            .send(PollRequest::Refresh)
            .await
            .map_err(|_| CoreError::SessionClosed)
    }

    // ── Media ────────────────────────────────────────────────────────

    /// A live JPEG snapshot, closest to `wanted` in size.
    pub async fn snapshot(&self, wanted: Option<Resolution>) -> Result<Bytes, CoreError> {
        self.ensure_open()?;
        self.inner.media.snapshot(wanted).await
    }

    /// Open the MJPEG live preview. Ends on session close.
    pub async fn live_stream(&self, wanted: Option<Resolution>) -> Result<LiveStream, CoreError> {
        self.ensure_open()?;
        self.inner.media.live_stream(wanted).await
    }

    /// RTSP source URL with embedded credentials, for a media player.
    pub fn rtsp_url(&self) -> Result<Url, CoreError> {
        self.inner.media.rtsp_url(self.inner.config.auth.as_ref())
    }
}
