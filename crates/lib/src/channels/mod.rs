//! Communication channels: the Zulip event-queue source and the Telegram destination.
//!
//! The bridge talks to both through traits (`EventSource`, `ChannelHandle`) so the loop
//! can be driven by in-memory fakes in tests.

mod handle;
mod inbound;
mod telegram;
mod zulip;

pub use handle::{ChannelError, ChannelHandle};
pub use inbound::InboundMessage;
pub use telegram::{telegram_api_base, TelegramChannel};
pub use zulip::{EventSource, QueueEvent, Registration, SourceError, ZulipClient};
