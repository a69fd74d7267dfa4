//! TeleZulip core library — Zulip event-queue consumption, message filtering and formatting,
//! and chunked delivery to a Telegram chat. Used by the `telezulip` CLI.

pub mod bridge;
pub mod channels;
pub mod config;
pub mod delivery;
pub mod filter;
pub mod format;
pub mod init;
