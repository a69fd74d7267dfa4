//! Zulip source: event-queue registration and long-poll `GET /events` via the REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Failure registering a queue or polling it. Every variant is handled the same way by the
/// bridge: drop the queue and re-register after the reconnect delay.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("zulip request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("zulip api error {code}: {msg}")]
    Api { code: String, msg: String },
    #[error("unexpected response from zulip: {0}")]
    Protocol(String),
}

/// Result of registering an event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub queue_id: String,
}

/// One event from the queue. `message` is present for `type == "message"`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<Value>,
}

/// Source of queue events, as the bridge consumes it.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// The bridge's own identity on the source platform (its bot email).
    fn identity(&self) -> &str;

    /// Register a new event queue for the given event types. Message content arrives as the
    /// raw text the sender typed, not rendered HTML.
    async fn register(&self, event_types: &[&str]) -> Result<Registration, SourceError>;

    /// Long-poll for events after `last_event_id` on `queue_id`.
    async fn get_events(
        &self,
        queue_id: &str,
        last_event_id: i64,
    ) -> Result<Vec<QueueEvent>, SourceError>;
}

/// Zulip REST client authenticated with a bot email and API key.
pub struct ZulipClient {
    email: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl ZulipClient {
    pub fn new(email: String, api_key: String, site: &str) -> Self {
        Self {
            email,
            api_key,
            base_url: format!("{}/api/v1", normalize_site(site)),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and unwrap Zulip's `{result, msg, code}` envelope.
    async fn call(&self, req: reqwest::RequestBuilder) -> Result<Value, SourceError> {
        let res = req
            .basic_auth(&self.email, Some(&self.api_key))
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        let value: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) if !status.is_success() => {
                return Err(SourceError::Api {
                    code: status.as_u16().to_string(),
                    msg: body,
                })
            }
            Err(e) => return Err(SourceError::Protocol(format!("invalid JSON: {}", e))),
        };
        let is_error = value.get("result").and_then(Value::as_str) == Some("error");
        if is_error || !status.is_success() {
            let code = value
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string());
            let msg = value
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(SourceError::Api { code, msg });
        }
        Ok(value)
    }
}

#[async_trait]
impl EventSource for ZulipClient {
    fn identity(&self) -> &str {
        &self.email
    }

    async fn register(&self, event_types: &[&str]) -> Result<Registration, SourceError> {
        let event_types = serde_json::to_string(event_types)
            .map_err(|e| SourceError::Protocol(e.to_string()))?;
        let url = format!("{}/register", self.base_url);
        let value = self
            .call(
                self.client
                    .post(&url)
                    .form(&[
                        ("event_types", event_types.as_str()),
                        ("apply_markdown", "false"),
                    ]),
            )
            .await?;
        let queue_id = value
            .get("queue_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::Protocol("no 'queue_id' in register response".into()))?;
        Ok(Registration {
            queue_id: queue_id.to_string(),
        })
    }

    async fn get_events(
        &self,
        queue_id: &str,
        last_event_id: i64,
    ) -> Result<Vec<QueueEvent>, SourceError> {
        let url = format!("{}/events", self.base_url);
        let last = last_event_id.to_string();
        let mut value = self
            .call(
                self.client
                    .get(&url)
                    .query(&[("queue_id", queue_id), ("last_event_id", last.as_str())]),
            )
            .await?;
        let events = value.get_mut("events").map(Value::take).ok_or_else(|| {
            SourceError::Protocol(format!(
                "no 'events' in response: {}",
                serde_json::to_string_pretty(&value).unwrap_or_default()
            ))
        })?;
        serde_json::from_value(events).map_err(|e| SourceError::Protocol(e.to_string()))
    }
}

/// Trim trailing slashes and default to https when no scheme is given.
fn normalize_site(site: &str) -> String {
    let site = site.trim().trim_end_matches('/');
    let site = site.strip_suffix("/api").unwrap_or(site);
    if site.starts_with("http://") || site.starts_with("https://") {
        site.to_string()
    } else {
        format!("https://{}", site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_without_scheme_gets_https() {
        let c = ZulipClient::new("bot@x".into(), "k".into(), "chat.example.org/");
        assert_eq!(c.base_url(), "https://chat.example.org/api/v1");
    }

    #[test]
    fn site_with_api_suffix() {
        assert_eq!(
            normalize_site("http://localhost:9991/api/"),
            "http://localhost:9991"
        );
    }

    #[test]
    fn identity_is_bot_email() {
        let c = ZulipClient::new("bot@x".into(), "k".into(), "https://z");
        assert_eq!(c.identity(), "bot@x");
    }

    #[test]
    fn queue_event_without_message() {
        let ev: QueueEvent =
            serde_json::from_value(serde_json::json!({ "id": 3, "type": "heartbeat" })).unwrap();
        assert_eq!(ev.id, 3);
        assert_eq!(ev.kind, "heartbeat");
        assert!(ev.message.is_none());
    }
}
