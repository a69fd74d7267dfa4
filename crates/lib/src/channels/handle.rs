//! Destination handle: the immutable value Delivery sends through.

use async_trait::async_trait;

/// Failure reaching the destination or a rejection from it.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("api error {status}: {description}")]
    Api { status: u16, description: String },
}

/// Handle to a destination channel (e.g. one Telegram chat). Holds its own credentials and
/// target; callers only hand it text.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Send one text message. One call is one request to the destination.
    async fn send_message(&self, text: &str) -> Result<(), ChannelError>;
}
