// Device HTTP client
//
// Wraps `reqwest::Client` with 2N URL construction, Digest/Basic auth, and
// `{ success, result | error }` envelope unwrapping. Endpoint groups
// (system, switch, log, camera) are inherent methods in separate files so
// this module stays focused on transport mechanics.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::{AuthMethod, Credentials, DigestState};
use crate::error::{AUTH_ERROR_CODES, Error};
use crate::models::ApiResponse;
use crate::transport::TransportConfig;

/// Raw response from a device request: status, content type, and body.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    /// Whether the device answered with a JSON document.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json"))
    }
}

/// HTTP client for one 2N intercom.
///
/// Requests are plain GETs with query parameters. Credentials are applied
/// per request: Basic directly, Digest by answering the last challenge the
/// device issued (re-challenged once on 401).
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
    digest: DigestState,
    timeout: Duration,
}

impl DeviceClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the device root, e.g. `https://192.168.1.50`.
    pub fn new(
        base_url: Url,
        credentials: Option<Credentials>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(
            http,
            base_url,
            credentials,
            transport.timeout,
        ))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            credentials,
            digest: DigestState::default(),
            timeout,
        }
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The configured credentials, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Default per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}{path}?{query}`.
    ///
    /// Query values are written as-is: every value this crate sends is a
    /// number, an identifier, or a comma-separated identifier list, and the
    /// device expects the commas literally.
    pub(crate) fn api_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, Error> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            let joined = query
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&joined));
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Issue a request and buffer the whole body.
    ///
    /// `timeout` overrides the default deadline (long-poll pulls need more
    /// than the device's own hold time).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<RawResponse, Error> {
        let url = self.api_url(path, query)?;
        let deadline = timeout.unwrap_or(self.timeout);
        let resp = self.send(&method, &url, Some(deadline)).await?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp
            .bytes()
            .await
            .map_err(|e| transport_error(e, deadline))?;

        trace!(%status, bytes = body.len(), "{} {}", method, path);
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    /// Open a request without buffering the body (media streams).
    ///
    /// The request timeout bounds the wait for response headers only; the
    /// caller enforces an idle timeout on the body.
    pub(crate) async fn open(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, Error> {
        let url = self.api_url(path, query)?;
        let resp = tokio::time::timeout(self.timeout, self.send(&Method::GET, &url, None))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                path: path.to_owned(),
            });
        }
        Ok(resp)
    }

    /// GET a JSON endpoint and unwrap the envelope's `result`.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<T, Error> {
        let raw = self.request(Method::GET, path, query, timeout).await?;
        parse_envelope::<T>(path, &raw)?.ok_or_else(|| Error::Deserialization {
            message: format!("{path}: envelope has no result"),
            body: String::from_utf8_lossy(&raw.body).into_owned(),
        })
    }

    /// GET an action endpoint whose envelope carries no meaningful result.
    pub(crate) async fn get_ack(&self, path: &str, query: &[(&str, String)]) -> Result<(), Error> {
        let raw = self.request(Method::GET, path, query, None).await?;
        parse_envelope::<serde_json::Value>(path, &raw)?;
        Ok(())
    }

    /// Send with auth applied, re-answering one fresh digest challenge.
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, Error> {
        debug!("{} {}", method, url.path());

        let resp = self.dispatch(method, url, timeout).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return reject_forbidden(resp);
        }

        let Some(creds) = &self.credentials else {
            return Err(Error::Authentication {
                message: "device requires credentials but none are configured".into(),
            });
        };
        if creds.method == AuthMethod::Basic {
            return Err(Error::Authentication {
                message: "device rejected basic credentials".into(),
            });
        }

        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Authentication {
                message: "401 without a WWW-Authenticate challenge".into(),
            })?;
        self.digest.store_challenge(challenge)?;

        let retry = self.dispatch(method, url, timeout).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "device rejected digest credentials".into(),
            });
        }
        reject_forbidden(retry)
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &Url,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, Error> {
        let mut req = self.http.request(method.clone(), url.clone());
        if let Some(deadline) = timeout {
            req = req.timeout(deadline);
        }

        if let Some(creds) = &self.credentials {
            match creds.method {
                AuthMethod::Basic => {
                    req = req.basic_auth(&creds.username, Some(creds.password.expose_secret()));
                }
                AuthMethod::Digest => {
                    if let Some(header) = self.digest.authorization(creds, url)? {
                        req = req.header(AUTHORIZATION, header);
                    }
                }
            }
        }

        req.send()
            .await
            .map_err(|e| transport_error(e, timeout.unwrap_or(self.timeout)))
    }
}

fn reject_forbidden(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    if resp.status() == StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: "account lacks permission for this API".into(),
        });
    }
    Ok(resp)
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        Error::Transport(err)
    }
}

/// Parse the `{ success, result | error }` envelope.
///
/// Returns `Ok(None)` for a successful envelope without `result`.
pub(crate) fn parse_envelope<T: DeserializeOwned>(
    path: &str,
    raw: &RawResponse,
) -> Result<Option<T>, Error> {
    let envelope: ApiResponse<T> = match serde_json::from_slice(&raw.body) {
        Ok(envelope) => envelope,
        Err(_) if !raw.status.is_success() => {
            return Err(Error::Status {
                status: raw.status.as_u16(),
                path: path.to_owned(),
            });
        }
        Err(e) => {
            return Err(Error::Deserialization {
                message: format!("{path}: {e}"),
                body: String::from_utf8_lossy(&raw.body).into_owned(),
            });
        }
    };

    if envelope.success {
        return Ok(envelope.result);
    }

    let Some(err) = envelope.error else {
        return Err(Error::Device {
            code: 0,
            param: None,
            message: format!("{path} failed without error details"),
        });
    };
    let message = err
        .description
        .unwrap_or_else(|| format!("error code {}", err.code));
    if AUTH_ERROR_CODES.contains(&err.code) {
        return Err(Error::Authentication { message });
    }
    Err(Error::Device {
        code: err.code,
        param: err.param,
        message,
    })
}
