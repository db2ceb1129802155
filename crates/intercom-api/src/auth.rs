use std::sync::{Mutex, PoisonError};

use digest_auth::{AuthContext, WwwAuthenticateHeader};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Which HTTP authentication scheme the device expects.
///
/// 2N devices default to Digest; Basic must be enabled explicitly in the
/// device's HTTP API service settings.
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
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AuthMethod {
    #[default]
    Digest,
    Basic,
}

/// Credentials for the device HTTP API.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub method: AuthMethod,
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(method: AuthMethod, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            method,
            username: username.into(),
            password,
        }
    }
}

/// Digest challenge cache.
///
/// The first request goes out without an `Authorization` header. When the
/// device answers 401 the `WWW-Authenticate` challenge is parsed and kept
/// here, and every later request answers it directly (bumping the nonce
/// count) so steady-state traffic is a single round trip.
#[derive(Debug, Default)]
pub(crate) struct DigestState {
    prompt: Mutex<Option<WwwAuthenticateHeader>>,
}

impl DigestState {
    /// Replace the cached challenge with a fresh one from the device.
    pub(crate) fn store_challenge(&self, header: &str) -> Result<(), Error> {
        let prompt = digest_auth::parse(header).map_err(|e| Error::Authentication {
            message: format!("unparseable digest challenge: {e}"),
        })?;
        *self.prompt.lock().unwrap_or_else(PoisonError::into_inner) = Some(prompt);
        Ok(())
    }

    /// Compute an `Authorization` header for `url`, if a challenge is cached.
    pub(crate) fn authorization(
        &self,
        credentials: &Credentials,
        url: &Url,
    ) -> Result<Option<String>, Error> {
        let mut guard = self.prompt.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(prompt) = guard.as_mut() else {
            return Ok(None);
        };

        let uri = request_uri(url);
        let context = AuthContext::new(
            credentials.username.as_str(),
            credentials.password.expose_secret(),
            uri.as_str(),
        );
        let answer = prompt.respond(&context).map_err(|e| Error::Authentication {
            message: format!("failed to answer digest challenge: {e}"),
        })?;
        Ok(Some(answer.to_header_string()))
    }
}

/// The request-target used in the digest `uri=` field: path plus query.
fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CHALLENGE: &str =
        r#"Digest realm="HTTP API", qop="auth", nonce="1f3d9c0a", algorithm=MD5"#;

    fn creds() -> Credentials {
        Credentials::new(AuthMethod::Digest, "admin", SecretString::from("2n"))
    }

    #[test]
    fn no_header_before_challenge() {
        let state = DigestState::default();
        let url = Url::parse("https://door.local/api/system/info").unwrap();
        assert_eq!(state.authorization(&creds(), &url).unwrap(), None);
    }

    #[test]
    fn answers_cached_challenge_with_query_uri() {
        let state = DigestState::default();
        state.store_challenge(CHALLENGE).unwrap();
        let url = Url::parse("https://door.local/api/log/pull?id=7&timeout=25").unwrap();

        let header = state.authorization(&creds(), &url).unwrap().unwrap();
        assert!(header.starts_with("Digest "));
        assert!(header.contains(r#"username="admin""#));
        assert!(header.contains(r#"uri="/api/log/pull?id=7&timeout=25""#));
    }

    #[test]
    fn rejects_garbage_challenge() {
        let state = DigestState::default();
        let err = state.store_challenge("Bearer realm=x").unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn auth_method_parses_case_insensitively() {
        assert_eq!("Digest".parse::<AuthMethod>().unwrap(), AuthMethod::Digest);
        assert_eq!("basic".parse::<AuthMethod>().unwrap(), AuthMethod::Basic);
        assert_eq!(AuthMethod::Basic.to_string(), "basic");
    }
}
