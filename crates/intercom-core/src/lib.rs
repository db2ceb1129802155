//! Device session and event coordinator for 2N IP intercoms.
//!
//! Sits between `intercom-api` and a host (the `intercom` CLI, or any
//! automation platform) and keeps a self-healing view of one device:
//!
//! - **[`DeviceSession`]**: one per device, with an explicit
//!   [`open()`](DeviceSession::open) / [`close()`](DeviceSession::close)
//!   lifecycle. Opening probes identity and capabilities, then spawns the
//!   background tasks. [`DeviceSession::oneshot()`] runs a single action
//!   without the event channel.
//!
//! - **Subscription manager** ([`subscription`]): the long-poll event
//!   channel as an explicit [`SubscriptionMachine`] plus the task driving
//!   it. Invalidated channels are resubscribed, transient failures back off.
//!
//! - **Event dispatch**: device events become a closed [`EventKind`] set and
//!   are routed through a static table into sensors, [`PulseSensors`], relay
//!   updates and the [`BusEvent`] broadcast.
//!
//! - **Poll coordinator**: relay status on its own interval, one request in
//!   flight at most, stale state kept on failure.
//!
//! - **[`StateStore`]**: `watch` channels holding snapshots for hosts.
//!
//! - **Media**: live snapshots, the MJPEG preview stream, the RTSP URL.

pub mod config;
pub mod entity;
pub mod error;
pub mod model;
pub mod prober;
pub mod pulse;
pub mod store;
pub mod subscription;

mod dispatch;
mod media;
mod poll;
mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    AuthCredentials, BackoffConfig, EventConfig, MediaConfig, PollConfig, PulseConfig,
    RtspProfile, SessionConfig, TlsVerification,
};
pub use dispatch::BusEvent;
pub use entity::{EntityDescriptor, EntitySource, Platform};
pub use error::CoreError;
pub use media::{FALLBACK_RESOLUTION, LiveStream, select_resolution};
pub use pulse::{PulseSensor, PulseSensors};
pub use session::DeviceSession;
pub use store::StateStore;
pub use subscription::{SubscriptionMachine, SubscriptionState};

pub use model::{
    CallActivity, CapabilitySet, DEFAULT_EVENT_FILTER, DeviceEvent, DeviceInfo, EventKind,
    PulseKind, PulseSensorState, RelayCapability, RelayEntity, RelayState, RelayTable,
    SensorSnapshot,
};

// Wire types hosts need without depending on intercom-api directly.
pub use intercom_api::{AuthMethod, Frame, Resolution};
