//! Delivery: send a text payload to the destination, split into numbered parts when it
//! exceeds the chunk limit.

use crate::channels::{ChannelError, ChannelHandle};

/// Telegram's hard limit is 4096 characters; leave room for the part marker.
pub const MAX_CHUNK_LEN: usize = 4000;

/// One bounded piece of an outbound payload. `sequence_index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryChunk {
    pub text: String,
    pub sequence_index: usize,
    pub total_count: usize,
}

impl DeliveryChunk {
    /// Text as sent: prefixed with `Part i/N` when the payload was split.
    pub fn render(&self) -> String {
        if self.total_count > 1 {
            format!(
                "Part {}/{}\n\n{}",
                self.sequence_index, self.total_count, self.text
            )
        } else {
            self.text.clone()
        }
    }
}

/// A part failed to send. Parts before `part` were delivered and are not rolled back.
#[derive(Debug, thiserror::Error)]
#[error("error sending part {part}/{total}: {source}")]
pub struct DeliveryError {
    pub part: usize,
    pub total: usize,
    #[source]
    pub source: ChannelError,
}

/// Split `text` into consecutive pieces of at most `max_len` characters.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<DeliveryChunk> {
    let max_len = max_len.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return vec![DeliveryChunk {
            text: text.to_string(),
            sequence_index: 1,
            total_count: 1,
        }];
    }
    let total_count = chars.len().div_ceil(max_len);
    chars
        .chunks(max_len)
        .enumerate()
        .map(|(i, piece)| DeliveryChunk {
            text: piece.iter().collect(),
            sequence_index: i + 1,
            total_count,
        })
        .collect()
}

/// Send `text` to `destination`, one request per chunk, strictly in order. Stops at the first
/// failed part. Returns the number of parts sent.
pub async fn send(text: &str, destination: &dyn ChannelHandle) -> Result<usize, DeliveryError> {
    let chunks = split_into_chunks(text, MAX_CHUNK_LEN);
    let total = chunks.len();
    for chunk in &chunks {
        destination
            .send_message(&chunk.render())
            .await
            .map_err(|source| DeliveryError {
                part: chunk.sequence_index,
                total,
                source,
            })?;
        if total > 1 {
            log::info!(
                "sent message part {}/{} to {}",
                chunk.sequence_index,
                total,
                destination.id()
            );
        } else {
            log::info!("sent message to {}", destination.id());
        }
    }
    Ok(total)
}
