//! Inbound message from the source platform: one snapshot of a Zulip `message` event payload.

use serde_json::Value;

/// A message received from the source event queue. Fields the payload does not carry are `None`;
/// the raw payload is kept for logging when the message has to be dropped.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_email: Option<String>,
    pub sender_full_name: Option<String>,
    /// Stream name, or the comma-joined recipient names for a private message.
    pub display_recipient: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub raw: Value,
}

impl InboundMessage {
    /// Build a snapshot from the `message` object of a queue event.
    pub fn from_payload(raw: Value) -> Self {
        let field = |name: &str| raw.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            sender_email: field("sender_email"),
            sender_full_name: field("sender_full_name"),
            display_recipient: raw.get("display_recipient").and_then(recipient_label),
            subject: field("subject"),
            content: field("content"),
            raw,
        }
    }

    /// Pretty JSON of the raw payload, for log lines.
    pub fn snapshot(&self) -> String {
        serde_json::to_string_pretty(&self.raw).unwrap_or_else(|_| self.raw.to_string())
    }
}

/// Stream messages carry the stream name as a string; private messages carry a list of recipients.
fn recipient_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(users) => {
            let names: Vec<&str> = users
                .iter()
                .filter_map(|u| {
                    u.get("full_name")
                        .or_else(|| u.get("email"))
                        .and_then(Value::as_str)
                })
                .collect();
            if names.is_empty() {
                None
            } else {
                Some(names.join(", "))
            }
        }
        _ => None,
    }
}
