// ── Core error types ──
//
// Session-level errors from intercom-core. Consumers never see HTTP
// status codes or JSON parse failures directly; the
// `From<intercom_api::Error>` impl folds transport-layer errors into the
// session taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport errors ─────────────────────────────────────────────
    #[error("Cannot reach device: {reason}")]
    Transport { reason: String },

    #[error("Device request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The device no longer recognises the event channel. Handled by the
    /// subscription task, which resubscribes; never returned to callers.
    #[error("Event subscription {id} is no longer valid")]
    SubscriptionInvalid { id: u64 },

    #[error("Device rejected the request (code {code}): {message}")]
    Device { code: u32, message: String },

    // ── Session errors ───────────────────────────────────────────────
    #[error("Setup failed: {message}")]
    Setup { message: String },

    #[error("Relay {relay} does not exist on this device")]
    RelayNotFound { relay: u32 },

    #[error("Device session is closed")]
    SessionClosed,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Wrap any error raised while probing the device as a setup failure,
    /// keeping authentication errors distinct so operators see the cause.
    pub(crate) fn setup(step: &str, err: intercom_api::Error) -> Self {
        match CoreError::from(err) {
            auth @ CoreError::AuthenticationFailed { .. } => auth,
            other => CoreError::Setup {
                message: format!("{step}: {other}"),
            },
        }
    }

    /// Classify a failed pull on channel `id`.
    pub(crate) fn pull_failure(id: u64, err: intercom_api::Error) -> Self {
        if err.is_invalid_subscription() {
            CoreError::SubscriptionInvalid { id }
        } else if err.is_auth() {
            CoreError::AuthenticationFailed {
                message: err.to_string(),
            }
        } else {
            CoreError::from(err)
        }
    }

    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<intercom_api::Error> for CoreError {
    fn from(err: intercom_api::Error) -> Self {
        use intercom_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Transport(ref e) if e.is_timeout() => CoreError::Timeout { timeout_secs: 0 },
            Api::Transport(e) => CoreError::Transport {
                reason: e.to_string(),
            },
            Api::Tls(msg) => CoreError::Transport {
                reason: format!("TLS error: {msg}"),
            },
            Api::Stream(msg) => CoreError::Transport { reason: msg },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Status { status, path } => CoreError::Transport {
                reason: format!("HTTP {status} from {path}"),
            },
            Api::Device { code, param, message } => CoreError::Device {
                code,
                message: match param {
                    Some(p) => format!("{message} (param '{p}')"),
                    None => message,
                },
            },
            Api::Deserialization { message, .. } => CoreError::Transport {
                reason: format!("unexpected response: {message}"),
            },
        }
    }
}
