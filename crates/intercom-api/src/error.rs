use thiserror::Error;

/// Device error code reported when a request parameter holds an invalid
/// value. Paired with `param == "id"` on a log pull it means the
/// subscription channel no longer exists on the device.
pub const ERR_INVALID_PARAMETER_VALUE: u32 = 12;

/// Device error codes that indicate missing or rejected credentials.
pub const AUTH_ERROR_CODES: [u32; 3] = [8, 9, 10];

/// Top-level error type for the `intercom-api` crate.
///
/// Covers every failure mode of the device HTTP API: authentication,
/// transport, the `{success, error}` envelope, and multipart media streams.
/// `intercom-core` maps these into session-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials missing, rejected, or the auth handshake failed.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status without a parseable device envelope.
    #[error("Unexpected HTTP status {status} from {path}")]
    Status { status: u16, path: String },

    // ── Device API ──────────────────────────────────────────────────
    /// Error reported by the device in the `{success: false, error}` envelope.
    #[error("Device error {code}{}: {message}", param_suffix(.param.as_deref()))]
    Device {
        code: u32,
        param: Option<String>,
        message: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Multipart media stream was malformed or stalled.
    #[error("Media stream error: {0}")]
    Stream(String),
}

fn param_suffix(param: Option<&str>) -> String {
    param.map(|p| format!(" (param '{p}')")).unwrap_or_default()
}

impl Error {
    /// Returns `true` if the device rejected our credentials.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Device { code, .. } => AUTH_ERROR_CODES.contains(code),
            _ => false,
        }
    }

    /// Returns `true` if a log pull failed because the channel id is unknown
    /// to the device (expired, device rebooted, or explicitly closed).
    pub fn is_invalid_subscription(&self) -> bool {
        matches!(
            self,
            Self::Device { code: ERR_INVALID_PARAMETER_VALUE, param: Some(p), .. } if p == "id"
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Timeout { .. } | Self::Stream(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Extract the device error code, if available.
    pub fn device_error_code(&self) -> Option<u32> {
        match self {
            Self::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}
