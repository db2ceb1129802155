// Event log endpoints
//
// The device keeps a per-subscription queue of log events. A client opens
// a channel with `subscribe`, drains it with long-poll `pull` requests, and
// closes it with `unsubscribe` (or lets `duration` expire).

use std::time::Duration;

use tracing::debug;

use crate::client::DeviceClient;
use crate::error::Error;
use crate::models::{LogCapsResult, LogEvent, PullResult, SubscribeResult};

/// Slack added on top of the device-side hold time before the HTTP request
/// itself is abandoned.
pub const PULL_GRACE: Duration = Duration::from_secs(5);

impl DeviceClient {
    /// Event types this device can report.
    ///
    /// `GET /api/log/caps`
    pub async fn get_log_caps(&self) -> Result<Vec<String>, Error> {
        let caps: LogCapsResult = self.get_json("/api/log/caps", &[], None).await?;
        Ok(caps.events)
    }

    /// Open a subscription channel for new events matching `filter`.
    ///
    /// `GET /api/log/subscribe?include=new&duration={secs}&filter=a,b`
    pub async fn log_subscribe(&self, filter: &[String], duration: Duration) -> Result<u64, Error> {
        let mut query = vec![
            ("include", "new".to_owned()),
            ("duration", duration.as_secs().to_string()),
        ];
        if !filter.is_empty() {
            query.push(("filter", filter.join(",")));
        }
        let result: SubscribeResult = self.get_json("/api/log/subscribe", &query, None).await?;
        debug!(id = result.id, events = filter.len(), "log channel opened");
        Ok(result.id)
    }

    /// Long-poll the channel. The device holds the request up to `timeout`
    /// and returns early as soon as events are queued.
    ///
    /// `GET /api/log/pull?id={id}&timeout={secs}`
    pub async fn log_pull(&self, id: u64, timeout: Duration) -> Result<Vec<LogEvent>, Error> {
        let query = [
            ("id", id.to_string()),
            ("timeout", timeout.as_secs().to_string()),
        ];
        let result: PullResult = self
            .get_json("/api/log/pull", &query, Some(timeout + PULL_GRACE))
            .await?;
        Ok(result.events)
    }

    /// Close the channel.
    ///
    /// `GET /api/log/unsubscribe?id={id}`
    pub async fn log_unsubscribe(&self, id: u64) -> Result<(), Error> {
        self.get_ack("/api/log/unsubscribe", &[("id", id.to_string())])
            .await
    }
}
