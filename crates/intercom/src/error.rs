//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use intercom_config::ConfigError;
use intercom_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the device: {reason}")]
    #[diagnostic(
        code(intercom::connection_failed),
        help(
            "Check that the intercom is powered and reachable from this host.\n\
             For a self-signed certificate try: intercom info --insecure"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Device request timed out after {seconds}s")]
    #[diagnostic(
        code(intercom::timeout),
        help("Increase the timeout with --timeout or check the network path to the device.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(intercom::auth_failed),
        help(
            "Verify the HTTP API account under Services > HTTP API > Account on the device.\n\
             The account needs the privileges for the commands you run, and\n\
             auth_method must match the service setting (digest or basic)."
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials for profile '{profile}'")]
    #[diagnostic(
        code(intercom::no_credentials),
        help(
            "Set username and password in the profile, or export\n\
             INTERCOM_USERNAME and INTERCOM_PASSWORD, or pass --username / --password."
        )
    )]
    NoCredentials { profile: String },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Device setup failed: {message}")]
    #[diagnostic(
        code(intercom::setup),
        help("The device did not answer the identity or capability probes. Is this a 2N intercom?")
    )]
    Setup { message: String },

    #[error("Device rejected the request (code {code}): {message}")]
    #[diagnostic(code(intercom::device_error))]
    Device { code: u32, message: String },

    #[error("Relay {relay} does not exist on this device")]
    #[diagnostic(
        code(intercom::relay_not_found),
        help("List the relays with: intercom relays")
    )]
    RelayNotFound { relay: u32 },

    #[error("Device session closed unexpectedly")]
    #[diagnostic(code(intercom::session_closed))]
    SessionClosed,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(intercom::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(intercom::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(intercom::no_config),
        help(
            "Pass --host, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Could not load configuration: {message}")]
    #[diagnostic(code(intercom::config))]
    Config { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(intercom::io))]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(intercom::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(intercom::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::RelayNotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport { reason } => CliError::ConnectionFailed { reason },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::SubscriptionInvalid { id } => CliError::ConnectionFailed {
                reason: format!("event subscription {id} was dropped by the device"),
            },
            CoreError::Device { code, message } => CliError::Device { code, message },
            CoreError::Setup { message } => CliError::Setup { message },
            CoreError::RelayNotFound { relay } => CliError::RelayNotFound { relay },
            CoreError::SessionClosed => CliError::SessionClosed,
            CoreError::Config { message } => CliError::Validation {
                field: "device".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::NoProfile => CliError::NoConfig {
                path: intercom_config::config_path().display().to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other @ (ConfigError::Serialization(_) | ConfigError::Figment(_)) => {
                CliError::Config {
                    message: other.to_string(),
                }
            }
        }
    }
}
