//! Delivery of new entries to notification sinks.
//!
//! Every sink implements [`Sink`]: format one entry its own way and send it.
//! The [`dispatcher`] fans a batch of entries out to all enabled sinks and
//! reports per-(entry, sink) outcomes.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::SinkConfig;
use crate::feed::Entry;

mod dispatcher;
mod telegram;
mod webhook;

pub use dispatcher::{deliver, DeliveryOptions, DeliveryOutcome, DeliveryReport, DeliveryTask};
pub use telegram::{format_message, TelegramSink, TELEGRAM_MAX_MESSAGE_CHARS};
pub use webhook::{WebhookPayload, WebhookSink};

/// Why a single delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Credentials were rejected (HTTP 401/403)
    #[error("Authentication rejected")]
    AuthFailed,
    /// The remote throttled us (HTTP 429)
    #[error("Rate limited{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<u64> },
    /// The remote answered with a non-2xx status
    #[error("Rejected by server: status {0}")]
    RejectedByServer(u16),
    /// Transport failures, timeouts, and Telegram statuses other than auth or throttling
    #[error("Network error: {0}")]
    NetworkFailed(String),
}

fn retry_suffix(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    }
}

/// A delivery channel.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short stable name used in logs and reports (e.g. `"telegram"`).
    fn name(&self) -> &str;

    /// Formats and sends one entry.
    async fn send(&self, entry: &Entry) -> Result<(), SinkError>;
}

/// How many sink successes an entry needs before it counts as delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPolicy {
    /// At least one enabled sink succeeded.
    #[default]
    Any,
    /// Every enabled sink succeeded.
    All,
}

/// Per-sink construction settings shared by all sinks.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub send_timeout: Duration,
    pub summary_max_chars: usize,
    pub telegram_api_base: String,
}

/// Instantiates one sink per enabled entry in `config`.
pub fn build_sinks(
    config: &SinkConfig,
    client: &reqwest::Client,
    options: &SinkOptions,
) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

    if let Some(telegram) = &config.telegram {
        sinks.push(Box::new(TelegramSink::new(
            client.clone(),
            &options.telegram_api_base,
            telegram,
            options.send_timeout,
            options.summary_max_chars,
        )));
    }

    if let Some(url) = &config.webhook_url {
        sinks.push(Box::new(WebhookSink::new(
            client.clone(),
            url,
            options.send_timeout,
        )));
    }

    tracing::info!(
        sinks = ?sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Enabled sinks"
    );
    sinks
}
