//! Outbound text rendering: substitutes message fields into a pattern's template.
//!
//! Templates know exactly four placeholders: `{sender}`, `{stream}`, `{topic}`, `{content}`.
//! `{{` and `}}` produce literal braces. [`render_html`] escapes the substituted values (not the
//! template) for Telegram's HTML parse mode.

use crate::channels::InboundMessage;
use crate::config::FilterPattern;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Sender,
    Stream,
    Topic,
    Content,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sender" => Some(Self::Sender),
            "stream" => Some(Self::Stream),
            "topic" => Some(Self::Topic),
            "content" => Some(Self::Content),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Stream => "stream",
            Self::Topic => "topic",
            Self::Content => "content",
        }
    }

    fn resolve(self, message: &InboundMessage) -> Option<&str> {
        match self {
            Self::Sender => message.sender_full_name.as_deref(),
            Self::Stream => message.display_recipient.as_deref(),
            Self::Topic => message.subject.as_deref(),
            Self::Content => message.content.as_deref(),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("required message field missing: {0}")]
    MissingField(Placeholder),
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("malformed template: {0}")]
    Malformed(String),
}

/// Render `message` with the pattern's template (or the default one).
pub fn render(message: &InboundMessage, pattern: &FilterPattern) -> Result<String, FormatError> {
    substitute(message, pattern, |value, out| out.push_str(value))
}

/// Like [`render`], with `<`, `>` and `&` in message fields escaped as HTML entities.
pub fn render_html(
    message: &InboundMessage,
    pattern: &FilterPattern,
) -> Result<String, FormatError> {
    substitute(message, pattern, push_html_escaped)
}

fn push_html_escaped(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
}

fn substitute(
    message: &InboundMessage,
    pattern: &FilterPattern,
    push_value: impl Fn(&str, &mut String),
) -> Result<String, FormatError> {
    let template = pattern.template();
    let malformed = || FormatError::Malformed(template.to_string());
    let mut out = String::with_capacity(template.len() + 64);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(malformed()),
                        Some(ch) => name.push(ch),
                    }
                }
                let placeholder = Placeholder::parse(name.trim())
                    .ok_or(FormatError::UnknownPlaceholder(name))?;
                let value = placeholder
                    .resolve(message)
                    .ok_or(FormatError::MissingField(placeholder))?;
                push_value(value, &mut out);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(malformed()),
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message() -> InboundMessage {
        InboundMessage::from_payload(json!({
            "sender_email": "alice@x",
            "sender_full_name": "Alice",
            "display_recipient": "general",
            "subject": "updates",
            "content": "This is urgent news"
        }))
    }

    #[test]
    fn default_template() {
        let out = render(&message(), &FilterPattern::new("urgent", None)).unwrap();
        assert_eq!(out, "Alice posted in general/updates: This is urgent news");
    }

    #[test]
    fn custom_template() {
        let pattern = FilterPattern::new("urgent", Some("ALERT: {content}".into()));
        assert_eq!(render(&message(), &pattern).unwrap(), "ALERT: This is urgent news");
    }

    #[test]
    fn render_is_deterministic() {
        let pattern = FilterPattern::new("urgent", None);
        let msg = message();
        assert_eq!(render(&msg, &pattern), render(&msg, &pattern));
    }

    #[test]
    fn missing_referenced_field_fails() {
        let mut msg = message();
        msg.subject = None;
        let err = render(&msg, &FilterPattern::new("urgent", None)).unwrap_err();
        assert_eq!(err, FormatError::MissingField(Placeholder::Topic));
    }

    #[test]
    fn missing_unreferenced_field_is_fine() {
        let mut msg = message();
        msg.subject = None;
        msg.sender_full_name = None;
        let pattern = FilterPattern::new("urgent", Some("[{stream}] {content}".into()));
        assert_eq!(render(&msg, &pattern).unwrap(), "[general] This is urgent news");
    }

    #[test]
    fn escaped_braces() {
        let pattern = FilterPattern::new("x", Some("{{{sender}}}".into()));
        assert_eq!(render(&message(), &pattern).unwrap(), "{Alice}");
    }

    #[test]
    fn html_render_escapes_fields_but_not_template() {
        let mut msg = message();
        msg.content = Some("if a < b && c > d".into());
        msg.sender_full_name = Some("Tom & Jerry".into());
        let pattern = FilterPattern::new("x", Some("<b>{sender}</b>: {content}".into()));
        assert_eq!(
            render_html(&msg, &pattern).unwrap(),
            "<b>Tom &amp; Jerry</b>: if a &lt; b &amp;&amp; c &gt; d"
        );
        assert_eq!(
            render(&msg, &pattern).unwrap(),
            "<b>Tom & Jerry</b>: if a < b && c > d"
        );
    }

    #[test]
    fn html_render_reports_missing_fields_too() {
        let mut msg = message();
        msg.content = None;
        assert_eq!(
            render_html(&msg, &FilterPattern::new("x", None)).unwrap_err(),
            FormatError::MissingField(Placeholder::Content)
        );
    }

    #[test]
    fn unknown_placeholder() {
        let pattern = FilterPattern::new("x", Some("{sender_email}".into()));
        assert_eq!(
            render(&message(), &pattern).unwrap_err(),
            FormatError::UnknownPlaceholder("sender_email".into())
        );
    }

    #[test]
    fn unbalanced_braces() {
        for t in ["{content", "content}", "{con{tent}"] {
            let pattern = FilterPattern::new("x", Some(t.into()));
            assert!(matches!(
                render(&message(), &pattern),
                Err(FormatError::Malformed(_))
            ));
        }
    }
}
