//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `./config.json` or `~/.telezulip/config.json`) and
//! environment. Secrets can be supplied through `ZULIP_API_KEY` and `TELEGRAM_BOT_TOKEN`.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_FORMAT: &str = "{sender} posted in {stream}/{topic}: {content}";

const DEFAULT_PARSE_MODE: &str = "HTML";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Zulip bot credentials and server.
    #[serde(default)]
    pub zulip: ZulipConfig,

    /// Telegram bot token and target chat.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Which messages to forward. Absent => filtering disabled, nothing is forwarded.
    #[serde(default)]
    pub message_filter: MessageFilterConfig,
}

/// Zulip bot identity (same keys as a zuliprc `[api]` section).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZulipConfig {
    /// Bot email; also the identity used to skip the bridge's own messages.
    pub email: Option<String>,
    /// API key. Overridden by ZULIP_API_KEY env when set.
    pub api_key: Option<String>,
    /// Server URL, e.g. "https://chat.example.org". Scheme defaults to https.
    pub site: Option<String>,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Target chat. Accepts a JSON string or number (group ids are negative numbers).
    #[serde(default, deserialize_with = "string_or_number")]
    pub chat_id: Option<String>,
    /// sendMessage parse_mode (default "HTML"). Empty string sends plain text.
    pub parse_mode: Option<String>,
}

/// One interest pattern: case-insensitive substring plus the template used when it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPattern {
    #[serde(rename = "text")]
    pub match_text: String,
    /// Template with `{sender}`, `{stream}`, `{topic}`, `{content}`.
    /// Defaults to [`DEFAULT_FORMAT`].
    #[serde(rename = "format", default, skip_serializing_if = "Option::is_none")]
    pub format_template: Option<String>,
}

impl FilterPattern {
    pub fn new(match_text: impl Into<String>, format_template: Option<String>) -> Self {
        Self {
            match_text: match_text.into(),
            format_template,
        }
    }

    pub fn template(&self) -> &str {
        self.format_template.as_deref().unwrap_or(DEFAULT_FORMAT)
    }
}

/// Message filter: patterns are scanned in declared order, first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<FilterPattern>,
}

/// Required configuration is missing or invalid. Fatal at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required config: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("message_filter.patterns[{0}].text must not be empty")]
    EmptyPattern(usize),
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Str(s)) => Some(s),
        Some(Raw::Num(n)) => Some(n.to_string()),
        None => None,
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_override(var: &str) -> Option<String> {
    std::env::var(var).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Zulip API key: env ZULIP_API_KEY overrides config.
pub fn resolve_zulip_api_key(config: &Config) -> Option<String> {
    env_override("ZULIP_API_KEY").or_else(|| non_empty(config.zulip.api_key.as_ref()))
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_override("TELEGRAM_BOT_TOKEN").or_else(|| non_empty(config.telegram.bot_token.as_ref()))
}

/// Parse mode to send with every message; `None` when configured as empty.
pub fn resolve_parse_mode(config: &Config) -> Option<String> {
    match &config.telegram.parse_mode {
        Some(m) => non_empty(Some(m)),
        None => Some(DEFAULT_PARSE_MODE.to_string()),
    }
}

/// Credentials with every required field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub zulip_email: String,
    pub zulip_api_key: String,
    pub zulip_site: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
}

impl Config {
    /// Check required fields and pattern invariants. Reports every missing field at once.
    pub fn validate(&self) -> std::result::Result<Credentials, ConfigError> {
        let email = non_empty(self.zulip.email.as_ref());
        let api_key = resolve_zulip_api_key(self);
        let site = non_empty(self.zulip.site.as_ref());
        let token = resolve_telegram_token(self);
        let chat_id = non_empty(self.telegram.chat_id.as_ref());

        let mut missing = Vec::new();
        for (name, value) in [
            ("zulip.email", &email),
            ("zulip.api_key", &api_key),
            ("zulip.site", &site),
            ("telegram.bot_token", &token),
            ("telegram.chat_id", &chat_id),
        ] {
            if value.is_none() {
                missing.push(name.to_string());
            }
        }

        match (email, api_key, site, token, chat_id) {
            (
                Some(zulip_email),
                Some(zulip_api_key),
                Some(zulip_site),
                Some(telegram_token),
                Some(telegram_chat_id),
            ) => {
                if let Some(i) = self
                    .message_filter
                    .patterns
                    .iter()
                    .position(|p| p.match_text.is_empty())
                {
                    return Err(ConfigError::EmptyPattern(i));
                }
                Ok(Credentials {
                    zulip_email,
                    zulip_api_key,
                    zulip_site,
                    telegram_token,
                    telegram_chat_id,
                })
            }
            _ => Err(ConfigError::Missing(missing)),
        }
    }
}

/// Resolve config path: TELEZULIP_CONFIG_PATH env (ignored when blank), then `config.json` in
/// the working directory, then `~/.telezulip/config.json`.
pub fn default_config_path() -> PathBuf {
    config_path_or_default(env_override("TELEZULIP_CONFIG_PATH"))
}

fn config_path_or_default(explicit: Option<String>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }
    let local = PathBuf::from("config.json");
    if local.exists() {
        return local;
    }
    dirs::home_dir()
        .map(|h| h.join(".telezulip").join("config.json"))
        .unwrap_or(local)
}

/// Load config from `path` (or the default path). A missing file is an error: credentials are
/// required. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        anyhow::bail!(
            "config file not found: {} (run `telezulip init` to create one)",
            path.display()
        );
    }
    let config = parse_config_file(&path)?;
    log::debug!("loaded config from {}", path.display());
    Ok((config, path))
}

fn parse_config_file(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}
