//! Run configuration: the optional `feedcast.toml`, the plaintext feed list, and
//! sink credentials from the environment.
//!
//! The TOML file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::notify::DeliveryPolicy;
use crate::util::validate_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Required configuration is absent or unusable.
    #[error("Missing configuration: {0}")]
    Missing(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level run configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plaintext feed list, one URL per line.
    pub feeds_file: PathBuf,

    /// JSON document of previously delivered entry identities.
    pub history_file: PathBuf,

    /// Timeout for a single feed download, headers through body.
    pub fetch_timeout_secs: u64,

    /// Timeout for a single sink delivery.
    pub send_timeout_secs: u64,

    /// Maximum number of feeds downloaded at once.
    pub fetch_concurrency: usize,

    /// Summary length cap in characters for chat messages.
    pub summary_max_chars: usize,

    /// Skip entries older than this many hours. 0 = no age filter.
    pub max_entry_age_hours: u64,

    /// Identities kept per feed in history (most recent). 0 = unlimited.
    pub max_history_per_feed: usize,

    /// Which sink outcomes mark an entry as delivered.
    pub delivery_policy: DeliveryPolicy,

    /// Pause between consecutive deliveries in milliseconds.
    pub delivery_interval_ms: u64,

    /// Base URL of the Telegram Bot API.
    pub telegram_api_base: String,

    /// Target chat (alternative to TELEGRAM_CHAT_ID env var).
    /// Env var takes precedence over config file.
    pub telegram_chat_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds_file: PathBuf::from("rss.config"),
            history_file: PathBuf::from("data.json"),
            fetch_timeout_secs: 30,
            send_timeout_secs: 15,
            fetch_concurrency: 4,
            summary_max_chars: 200,
            max_entry_age_hours: 0,
            max_history_per_feed: 0,
            delivery_policy: DeliveryPolicy::Any,
            delivery_interval_ms: 0,
            telegram_api_base: "https://api.telegram.org".to_string(),
            telegram_chat_id: None,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "feeds_file",
    "history_file",
    "fetch_timeout_secs",
    "send_timeout_secs",
    "fetch_concurrency",
    "summary_max_chars",
    "max_entry_age_hours",
    "max_history_per_feed",
    "delivery_policy",
    "delivery_interval_ms",
    "telegram_api_base",
    "telegram_chat_id",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

// ============================================================================
// Feed List
// ============================================================================

/// A configured feed URL. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
}

/// Parses the plaintext feed list.
///
/// One URL per line; surrounding whitespace is trimmed. Blank lines and lines
/// starting with `#` are ignored. Lines that are not absolute http(s) URLs are
/// skipped with a warning. Repeated URLs are collapsed to their first
/// occurrence so a feed is never fetched twice in one run.
pub fn parse_feed_list(content: &str) -> Vec<FeedSource> {
    let mut sources: Vec<FeedSource> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Err(e) = validate_url(line) {
            tracing::warn!(line = idx + 1, value = %line, error = %e, "Skipping invalid feed URL");
            continue;
        }

        if sources.iter().any(|s| s.url == line) {
            tracing::debug!(url = %line, "Duplicate feed URL, ignoring");
            continue;
        }

        sources.push(FeedSource {
            url: line.to_string(),
        });
    }

    sources
}

/// Reads and parses the feed list file.
///
/// A missing file or a list with no usable URLs is `ConfigError::Missing`: a
/// run without feeds is a setup error, not an empty success.
pub fn load_feed_sources(path: &Path) -> Result<Vec<FeedSource>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(format!(
                "feed list not found at {}",
                path.display()
            )));
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let sources = parse_feed_list(&content);
    if sources.is_empty() {
        return Err(ConfigError::Missing(format!(
            "no feeds configured in {}",
            path.display()
        )));
    }

    tracing::info!(path = %path.display(), feeds = sources.len(), "Loaded feed list");
    Ok(sources)
}

// ============================================================================
// Sink Credentials
// ============================================================================

pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";
pub const ENV_ENABLE_TELEGRAM: &str = "FEEDCAST_ENABLE_TELEGRAM";
pub const ENV_ENABLE_WEBHOOK: &str = "FEEDCAST_ENABLE_WEBHOOK";

/// Credentials for the Telegram sink.
///
/// `Debug` output shows the token as redacted via `SecretString`.
#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
}

/// Which sinks are enabled for this run, with their credentials.
///
/// Built once at startup and passed by reference; `None` means disabled.
#[derive(Debug, Default)]
pub struct SinkConfig {
    pub telegram: Option<TelegramConfig>,
    pub webhook_url: Option<String>,
}

impl SinkConfig {
    /// Builds sink configuration from process environment variables.
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Builds sink configuration from an arbitrary key lookup.
    ///
    /// An unset enable switch means "enabled if credentials are present". A
    /// switch that is explicitly on with missing credentials is an error, as
    /// is a switch value that is not a recognizable boolean.
    pub fn from_lookup<F>(config: &Config, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = non_empty(ENV_TELEGRAM_TOKEN);
        let chat_id = non_empty(ENV_TELEGRAM_CHAT_ID).or_else(|| {
            config
                .telegram_chat_id
                .as_ref()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        });
        let telegram_switch = parse_switch(ENV_ENABLE_TELEGRAM, lookup(ENV_ENABLE_TELEGRAM))?;

        let telegram = match (telegram_switch, token, chat_id) {
            (Some(false), _, _) => None,
            (_, Some(token), Some(chat_id)) => Some(TelegramConfig {
                bot_token: SecretString::from(token),
                chat_id,
            }),
            (Some(true), token, _) => {
                let missing = if token.is_none() {
                    ENV_TELEGRAM_TOKEN
                } else {
                    ENV_TELEGRAM_CHAT_ID
                };
                return Err(ConfigError::Missing(format!(
                    "Telegram sink enabled but {} is not set",
                    missing
                )));
            }
            (None, Some(_), None) => {
                tracing::warn!("TELEGRAM_BOT_TOKEN is set but no chat id is configured, Telegram sink disabled");
                None
            }
            (None, _, _) => None,
        };

        let webhook_switch = parse_switch(ENV_ENABLE_WEBHOOK, lookup(ENV_ENABLE_WEBHOOK))?;
        let webhook_url = match (webhook_switch, non_empty(ENV_WEBHOOK_URL)) {
            (Some(false), _) => None,
            (Some(true), None) => {
                return Err(ConfigError::Missing(format!(
                    "Webhook sink enabled but {} is not set",
                    ENV_WEBHOOK_URL
                )));
            }
            (_, Some(url)) => {
                validate_url(&url).map_err(|e| {
                    ConfigError::Missing(format!("{} is not a usable URL: {}", ENV_WEBHOOK_URL, e))
                })?;
                Some(url)
            }
            (None, None) => None,
        };

        Ok(Self {
            telegram,
            webhook_url,
        })
    }

    /// Returns true if no sink is enabled.
    pub fn is_empty(&self) -> bool {
        self.telegram.is_none() && self.webhook_url.is_none()
    }
}

fn parse_switch(key: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(ConfigError::Missing(format!(
            "{} has unrecognized value '{}' (expected true/false)",
            key, other
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
