//! Configuration for the intercom CLI.
//!
//! TOML profiles, credential resolution (env + plaintext), and translation
//! to `intercom_core::SessionConfig`. Core never reads files; this crate is
//! the only place that does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use intercom_core::{AuthCredentials, AuthMethod, RtspProfile, SessionConfig, TlsVerification};

/// Environment variable consulted for the password when a profile names none.
pub const PASSWORD_ENV: &str = "INTERCOM_PASSWORD";
/// Environment variable consulted for the username when a profile names none.
pub const USERNAME_ENV: &str = "INTERCOM_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no profile selected and no default profile configured")]
    NoProfile,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is selected on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: `name` if given, else `default_profile`, else the
    /// only profile when exactly one exists.
    pub fn select_profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        if let Some(name) = name {
            return self
                .profiles
                .get_key_value(name)
                .map(|(k, p)| (k.as_str(), p))
                .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() });
        }
        if let Some((k, p)) = self
            .default_profile
            .as_deref()
            .and_then(|d| self.profiles.get_key_value(d))
        {
            return Ok((k.as_str(), p));
        }

        // A stale default falls back to the only profile.
        let mut profiles = self.profiles.iter();
        match (profiles.next(), profiles.next()) {
            (Some((name, profile)), None) => Ok((name.as_str(), profile)),
            _ => Err(ConfigError::NoProfile),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Verify the device's TLS certificate.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            verify_ssl: default_verify_ssl(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_verify_ssl() -> bool {
    true
}
fn default_timeout() -> u64 {
    10
}

/// A named device profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Device address: a URL, or a bare host name / IP address.
    pub host: String,

    /// Scheme for a bare `host`. Defaults to HTTPS.
    pub https: Option<bool>,

    /// "digest" (default), "basic", or "none".
    pub auth_method: Option<String>,

    pub username: Option<String>,

    /// Password (plaintext; prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override TLS verification.
    pub verify_ssl: Option<bool>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override request timeout (seconds).
    pub timeout: Option<u64>,

    /// "h264_stream" (default), "h265_stream", or "mjpeg_stream".
    pub rtsp_profile: Option<String>,

    pub rtsp_port: Option<u16>,

    /// Relay fired by `door-release`.
    pub door_release_switch: Option<u32>,

    /// Event types to subscribe to instead of the default set.
    pub events: Option<Vec<String>>,

    /// Long-poll hold time (seconds).
    pub pull_timeout: Option<u64>,

    /// Relay status poll interval (seconds).
    pub relay_interval: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "intercom", "intercom").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("intercom");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then `INTERCOM_`-prefixed environment variables.
///
/// Nested keys use a double underscore: `INTERCOM_DEFAULTS__TIMEOUT=5`,
/// `INTERCOM_PROFILES__GATE__HOST=10.0.0.9`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("INTERCOM_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve the password: `password_env` → `INTERCOM_PASSWORD` → plaintext.
fn resolve_password(
    profile: &Profile,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Option<SecretString> {
    profile
        .password_env
        .as_deref()
        .and_then(lookup)
        .or_else(|| lookup(PASSWORD_ENV))
        .or_else(|| profile.password.clone())
        .map(SecretString::from)
}

/// Resolve credentials for a profile.
///
/// `None` means the device is used without authentication: either
/// `auth_method = "none"`, or no method, username, or password is set.
pub fn resolve_auth(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<AuthCredentials>, ConfigError> {
    resolve_auth_with(profile, profile_name, &env_lookup)
}

fn resolve_auth_with(
    profile: &Profile,
    profile_name: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<AuthCredentials>, ConfigError> {
    let explicit = match profile.auth_method.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(m) if m.eq_ignore_ascii_case("none") => return Ok(None),
        Some(m) => Some(m.parse::<AuthMethod>().map_err(|_| {
            invalid(
                "auth_method",
                format!("expected 'digest', 'basic', or 'none', got '{m}'"),
            )
        })?),
    };

    let username = profile.username.clone().or_else(|| lookup(USERNAME_ENV));
    let password = resolve_password(profile, lookup);

    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(AuthCredentials {
            method: explicit.unwrap_or_default(),
            username,
            password,
        })),
        (None, None) if explicit.is_none() => Ok(None),
        _ => Err(ConfigError::NoCredentials {
            profile: profile_name.into(),
        }),
    }
}

// ── Translation to SessionConfig ────────────────────────────────────

/// The device URL for a profile. Bare hosts get `https://` unless
/// `https = false`.
pub fn device_url(profile: &Profile) -> Result<Url, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(invalid("host", "must not be empty"));
    }
    let raw = if host.contains("://") {
        host.to_owned()
    } else {
        let scheme = if profile.https.unwrap_or(true) {
            "https"
        } else {
            "http"
        };
        format!("{scheme}://{host}")
    };
    let url = Url::parse(&raw).map_err(|e| invalid("host", format!("invalid URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid("host", format!("expected an http(s) device URL, got '{raw}'")));
    }
    Ok(url)
}

fn seconds(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be at least 1 second"));
    }
    Ok(Duration::from_secs(value))
}

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    build_session_config(profile, profile_name, defaults, &env_lookup)
}

fn build_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<SessionConfig, ConfigError> {
    let url = device_url(profile)?;
    let auth = resolve_auth_with(profile, profile_name, lookup)?;
    let mut config = SessionConfig::new(url, auth);

    let verify = profile.verify_ssl.unwrap_or(defaults.verify_ssl);
    config.tls = match (verify, &profile.ca_cert) {
        (false, _) => TlsVerification::DangerAcceptInvalid,
        (true, Some(ca_path)) => TlsVerification::CustomCa(ca_path.clone()),
        (true, None) => TlsVerification::SystemDefaults,
    };

    config.timeout = seconds("timeout", profile.timeout.unwrap_or(defaults.timeout))?;
    if let Some(secs) = profile.pull_timeout {
        config.events.pull_timeout = seconds("pull_timeout", secs)?;
    }
    if let Some(secs) = profile.relay_interval {
        config.polling.relay_interval = seconds("relay_interval", secs)?;
    }
    if let Some(ref events) = profile.events {
        config.events.filter = Some(events.clone());
    }
    if let Some(ref name) = profile.rtsp_profile {
        config.media.rtsp_profile = name.parse::<RtspProfile>().map_err(|_| {
            invalid(
                "rtsp_profile",
                format!("expected 'h264_stream', 'h265_stream', or 'mjpeg_stream', got '{name}'"),
            )
        })?;
    }
    if let Some(port) = profile.rtsp_port {
        config.media.rtsp_port = port;
    }
    if let Some(relay) = profile.door_release_switch {
        config.door_release_switch = relay;
    }

    Ok(config)
}
