//! Event loop: keeps a Zulip event queue registered, long-polls it, and forwards matching
//! messages to the destination channel.
//!
//! Lifecycle: `Disconnected -> Registering -> Polling -> (per message) Dispatching -> Polling`.
//! Any registration or poll failure drops the queue and cursor, waits on the
//! [`ReconnectPolicy`], and registers a fresh queue. Events that arrive in between are lost
//! (at-most-once). Failures while dispatching a single message are logged and never leave
//! the polling state.

use crate::channels::{ChannelHandle, EventSource, InboundMessage, SourceError};
use crate::config::MessageFilterConfig;
use crate::{delivery, filter, format};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Event types requested at registration.
pub const EVENT_TYPES: &[&str] = &["message"];

/// Cursor value before any event has been seen on a queue.
pub const NO_EVENTS_YET: i64 = -1;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disconnected,
    Registering,
    Polling,
    Dispatching,
}

/// Position in one registered queue. `last_event_id` never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueCursor {
    pub queue_id: String,
    last_event_id: i64,
}

impl QueueCursor {
    pub fn new(queue_id: String) -> Self {
        Self {
            queue_id,
            last_event_id: NO_EVENTS_YET,
        }
    }

    pub fn last_event_id(&self) -> i64 {
        self.last_event_id
    }

    pub fn advance(&mut self, event_id: i64) {
        self.last_event_id = self.last_event_id.max(event_id);
    }
}

/// How long to wait before re-registering. `attempt` counts consecutive failures since the
/// last successful registration, starting at 1.
#[async_trait]
pub trait ReconnectPolicy: Send + Sync {
    async fn wait(&self, attempt: u32);
}

/// Same delay before every retry, forever.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(RECONNECT_DELAY)
    }
}

#[async_trait]
impl ReconnectPolicy for FixedDelay {
    async fn wait(&self, attempt: u32) {
        log::info!(
            "waiting {} seconds before reconnecting (attempt {})",
            self.delay.as_secs_f64(),
            attempt
        );
        tokio::time::sleep(self.delay).await;
    }
}

/// What happened to one message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Sent by the bridge's own identity; not looked at.
    SelfMessage,
    NoMatch,
    Forwarded { parts: usize },
    /// Matched but could not be formatted or delivered.
    Dropped,
}

/// The forwarding loop. Owns the queue cursor; source and destination are shared handles.
pub struct Bridge {
    source: Arc<dyn EventSource>,
    destination: Arc<dyn ChannelHandle>,
    filter: MessageFilterConfig,
    policy: Arc<dyn ReconnectPolicy>,
    escape_html: bool,
    state: LoopState,
    failures: u32,
}

impl Bridge {
    pub fn new(
        source: Arc<dyn EventSource>,
        destination: Arc<dyn ChannelHandle>,
        filter: MessageFilterConfig,
    ) -> Self {
        Self {
            source,
            destination,
            filter,
            policy: Arc::new(FixedDelay::default()),
            escape_html: false,
            state: LoopState::Disconnected,
            failures: 0,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Escape message fields as HTML entities when rendering; set when the destination
    /// parses messages as HTML.
    pub fn with_html_escaping(mut self, escape_html: bool) -> Self {
        self.escape_html = escape_html;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            log::debug!("bridge: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Log whether filtering is on and which patterns are watched.
    pub fn log_filter_summary(&self) {
        if !self.filter.enabled {
            log::info!("message filtering is disabled; nothing will be forwarded");
            return;
        }
        log::info!("message filtering is enabled");
        log::info!(
            "watching for {} message pattern(s)",
            self.filter.patterns.len()
        );
        for p in &self.filter.patterns {
            log::info!("- pattern: '{}'", p.match_text);
        }
    }

    /// Run forever: register, poll, and reconnect after every failure.
    pub async fn run(&mut self) {
        log::info!(
            "starting zulip to {} forwarder",
            self.destination.id()
        );
        self.log_filter_summary();
        loop {
            let err = self.run_cycle().await;
            log::error!("error in main loop: {}", err);
            self.backoff().await;
        }
    }

    /// One queue lifetime: register (retrying until it succeeds), then poll until a poll fails.
    /// Returns the failure that ended the queue.
    pub async fn run_cycle(&mut self) -> SourceError {
        let mut cursor = self.connect().await;
        loop {
            if let Err(e) = self.poll_once(&mut cursor).await {
                self.set_state(LoopState::Disconnected);
                return e;
            }
        }
    }

    async fn backoff(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.policy.wait(self.failures).await;
    }

    /// Register a new queue, retrying after the policy delay until registration succeeds.
    pub async fn connect(&mut self) -> QueueCursor {
        loop {
            self.set_state(LoopState::Registering);
            log::info!("registering new queue with zulip");
            match self.source.register(EVENT_TYPES).await {
                Ok(reg) => {
                    log::info!("queue registered successfully: {}", reg.queue_id);
                    self.failures = 0;
                    self.set_state(LoopState::Polling);
                    return QueueCursor::new(reg.queue_id);
                }
                Err(e) => {
                    log::error!("queue registration failed: {}", e);
                    self.set_state(LoopState::Disconnected);
                    self.backoff().await;
                }
            }
        }
    }

    /// Fetch one batch of events and dispatch its messages in order. The cursor advances past
    /// every event, message or not. Returns the number of events received.
    pub async fn poll_once(&mut self, cursor: &mut QueueCursor) -> Result<usize, SourceError> {
        log::debug!("getting events since id {}", cursor.last_event_id());
        let events = self
            .source
            .get_events(&cursor.queue_id, cursor.last_event_id())
            .await?;
        let count = events.len();
        for event in events {
            if event.kind == "message" {
                let payload = event.message.ok_or_else(|| {
                    SourceError::Protocol(format!("message event {} has no 'message'", event.id))
                })?;
                self.set_state(LoopState::Dispatching);
                self.dispatch(payload).await;
                self.set_state(LoopState::Polling);
            }
            cursor.advance(event.id);
        }
        Ok(count)
    }

    /// Filter, format, and deliver one message. Never fails; problems are logged and the
    /// message dropped.
    pub async fn dispatch(&self, payload: Value) -> Dispatch {
        let message = InboundMessage::from_payload(payload);
        if message.sender_email.as_deref() == Some(self.source.identity()) {
            log::debug!("skipping own message");
            return Dispatch::SelfMessage;
        }

        log::debug!(
            "received message from {} in {}/{}",
            message.sender_full_name.as_deref().unwrap_or("?"),
            message.display_recipient.as_deref().unwrap_or("?"),
            message.subject.as_deref().unwrap_or("?")
        );

        let Some(content) = message.content.as_deref() else {
            log::warn!("message has no content, dropping: {}", message.snapshot());
            return Dispatch::Dropped;
        };
        let Some(pattern) = filter::evaluate(content, &self.filter) else {
            log::debug!("message doesn't match any patterns, skipping");
            return Dispatch::NoMatch;
        };
        log::info!("message matches pattern: {}", pattern.match_text);

        let rendered = if self.escape_html {
            format::render_html(&message, pattern)
        } else {
            format::render(&message, pattern)
        };
        let text = match rendered {
            Ok(text) => text,
            Err(e) => {
                log::warn!("error formatting message: {}; message: {}", e, message.snapshot());
                return Dispatch::Dropped;
            }
        };

        match delivery::send(&text, self.destination.as_ref()).await {
            Ok(parts) => Dispatch::Forwarded { parts },
            Err(e) => {
                log::warn!(
                    "error sending to {}: {}; message: {}",
                    self.destination.id(),
                    e,
                    message.snapshot()
                );
                Dispatch::Dropped
            }
        }
    }
}
