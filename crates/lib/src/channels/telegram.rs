//! Telegram channel: sendMessage via Bot API to one configured chat.

use crate::channels::handle::{ChannelError, ChannelHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

/// Error body Telegram returns with a non-2xx status.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Telegram destination: posts every message to `chat_id` with an optional parse mode.
pub struct TelegramChannel {
    id: String,
    token: String,
    chat_id: String,
    parse_mode: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: String, chat_id: String, parse_mode: Option<String>) -> Self {
        Self::with_api_base(token, chat_id, parse_mode, telegram_api_base())
    }

    /// Same as `new` with an explicit Bot API base URL (tests, self-hosted Bot API servers).
    pub fn with_api_base(
        token: String,
        chat_id: String,
        parse_mode: Option<String>,
        api_base: String,
    ) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            chat_id,
            parse_mode: parse_mode.filter(|m| !m.trim().is_empty()),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Send a text message to the configured chat via sendMessage API.
    pub async fn send_text(&self, text: &str) -> Result<(), ChannelError> {
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: self.parse_mode.as_deref(),
        };
        let res = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        Ok(())
    }
}

/// Prefer Telegram's structured `description`; fall back to the raw body.
fn api_error(status: u16, body: &str) -> ChannelError {
    let description = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            description: Some(d),
            error_code,
        }) => match error_code {
            Some(code) => format!("{} (error_code {})", d, code),
            None => d,
        },
        _ => body.to_string(),
    };
    ChannelError::Api {
        status,
        description,
    }
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, text: &str) -> Result<(), ChannelError> {
        self.send_text(text).await
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| TELEGRAM_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_includes_token_and_method() {
        let ch = TelegramChannel::with_api_base(
            "123:ABC".into(),
            "42".into(),
            None,
            "https://api.telegram.org/".into(),
        );
        assert_eq!(
            ch.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn empty_parse_mode_is_omitted() {
        let ch = TelegramChannel::with_api_base(
            "t".into(),
            "42".into(),
            Some(" ".into()),
            "http://x".into(),
        );
        assert!(ch.parse_mode.is_none());
        let body = SendMessageRequest {
            chat_id: "42",
            text: "hi",
            parse_mode: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("parse_mode").is_none());
    }

    #[test]
    fn api_error_uses_description() {
        let err = api_error(
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        );
        match err {
            ChannelError::Api {
                status,
                description,
            } => {
                assert_eq!(status, 400);
                assert_eq!(description, "Bad Request: chat not found (error_code 400)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn api_error_falls_back_to_body() {
        let err = api_error(502, "Bad Gateway");
        assert_eq!(err.to_string(), "api error 502: Bad Gateway");
    }
}
