//! Profile selection and CLI flag overrides.
//!
//! This is the single place where CLI flags meet `intercom-config` and a
//! `SessionConfig` comes out.

use std::time::Duration;

use secrecy::SecretString;

use intercom_config::{Config, ConfigError, Profile};
use intercom_core::{SessionConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Profile name used when the device comes from `--host` alone.
const ADHOC_PROFILE: &str = "command-line";

/// Build the session config for this invocation: the selected profile
/// (or `--host` alone), then flag overrides.
pub fn session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = intercom_config::load_config()?;
    resolve(&cfg, global)
}

pub(crate) fn resolve(cfg: &Config, global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let (name, profile) = match cfg.select_profile(global.profile.as_deref()) {
        Ok((name, profile)) => (name.to_owned(), profile.clone()),
        Err(ConfigError::NoProfile) if global.host.is_some() => {
            (ADHOC_PROFILE.to_owned(), Profile::default())
        }
        Err(ConfigError::UnknownProfile { name }) => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(cfg),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let profile = with_overrides(profile, global);
    let mut config = intercom_config::profile_to_session_config(&profile, &name, &cfg.defaults)?;

    // The flag wins over INTERCOM_PASSWORD, which the profile chain checks first.
    if let (Some(auth), Some(password)) = (config.auth.as_mut(), global.password.as_ref()) {
        auth.password = SecretString::from(password.clone());
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        config.timeout = Duration::from_secs(secs);
    }

    tracing::debug!(profile = %name, url = %config.url, "resolved device");
    Ok(config)
}

fn with_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if let Some(ref password) = global.password {
        profile.password = Some(password.clone());
        profile.password_env = None;
    }
    profile
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
