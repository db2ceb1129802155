// ── Runtime session configuration ──
//
// These types describe *how* to talk to one intercom and how to pace the
// background loops. They carry credential data and tuning, but never touch
// disk. The CLI (or any host) constructs a `SessionConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use intercom_api::transport::{TlsMode, TransportConfig};
use intercom_api::{AuthMethod, Credentials};

/// Username and password plus the HTTP auth scheme to present them with.
#[derive(Debug, Clone)]
pub struct AuthCredentials {
    pub method: AuthMethod,
    pub username: String,
    pub password: SecretString,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (factory self-signed certificates).
    DangerAcceptInvalid,
}

/// Exponential backoff bounds for absorbed transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failure. Doubles per consecutive failure.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Event log subscription tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventConfig {
    /// How long the device may hold a pull request open.
    pub pull_timeout: Duration,
    /// Channel validity requested on subscribe.
    pub subscription_duration: Duration,
    /// Pause before resubscribing after the device dropped our channel.
    pub resubscribe_delay: Duration,
    pub backoff: BackoffConfig,
    /// Consecutive failed subscribes or pulls before event-driven sensors
    /// are reported unavailable.
    pub unavailable_after: u32,
    /// Explicit event filter. `None` uses the built-in default filter,
    /// an empty list disables the event channel.
    pub filter: Option<Vec<String>>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            pull_timeout: Duration::from_secs(25),
            subscription_duration: Duration::from_secs(3600),
            resubscribe_delay: Duration::from_secs(2),
            backoff: BackoffConfig::default(),
            unavailable_after: 3,
            filter: None,
        }
    }
}

/// Relay status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub relay_interval: Duration,
    /// Consecutive failed polls before relays are reported unavailable.
    pub unavailable_after: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            relay_interval: Duration::from_secs(5),
            unavailable_after: 3,
        }
    }
}

/// Dwell time of each self-resetting sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseConfig {
    pub rex: Duration,
    pub silent_alarm: Duration,
    pub invalid_credential: Duration,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            rex: Duration::from_secs(5),
            silent_alarm: Duration::from_secs(30),
            invalid_credential: Duration::from_secs(10),
        }
    }
}

/// Which RTSP stream the device should serve.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RtspProfile {
    #[default]
    H264Stream,
    H265Stream,
    MjpegStream,
}

/// Camera and media tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConfig {
    /// Frame rate requested for the live preview.
    pub mjpeg_fps: u32,
    /// A live preview with no bytes for this long is closed.
    pub stream_idle_timeout: Duration,
    pub rtsp_port: u16,
    pub rtsp_profile: RtspProfile,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            mjpeg_fps: 10,
            stream_idle_timeout: Duration::from_secs(30),
            rtsp_port: 554,
            rtsp_profile: RtspProfile::default(),
        }
    }
}

/// Configuration for one device session.
///
/// Built by the CLI, passed to `DeviceSession`; core never reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device URL (e.g., `https://192.168.1.50`).
    pub url: Url,
    /// `None` for devices with HTTP API authentication switched off.
    pub auth: Option<AuthCredentials>,
    pub tls: TlsVerification,
    /// Timeout for short requests (everything except pulls and streams).
    pub timeout: Duration,
    pub events: EventConfig,
    pub polling: PollConfig,
    pub pulses: PulseConfig,
    pub media: MediaConfig,
    /// Relay fired by the door release button.
    pub door_release_switch: u32,
}

impl SessionConfig {
    /// A config with default tuning for the device at `url`.
    pub fn new(url: Url, auth: Option<AuthCredentials>) -> Self {
        Self {
            url,
            auth,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            events: EventConfig::default(),
            polling: PollConfig::default(),
            pulses: PulseConfig::default(),
            media: MediaConfig::default(),
            door_release_switch: 1,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }

    pub(crate) fn credentials(&self) -> Option<Credentials> {
        self.auth
            .as_ref()
            .map(|a| Credentials::new(a.method, a.username.clone(), a.password.clone()))
    }
}
