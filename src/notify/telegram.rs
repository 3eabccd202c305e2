use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Sink, SinkError};
use crate::config::TelegramConfig;
use crate::feed::Entry;
use crate::util::{strip_control_chars, summary_to_plain_text, truncate_chars};

/// Telegram rejects messages longer than this (counted after entity parsing).
pub const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;

const MAX_TITLE_CHARS: usize = 256;
const MAX_SOURCE_CHARS: usize = 128;
const UNTITLED: &str = "(untitled)";

/// Sends entries to a chat through the Telegram Bot API `sendMessage` method.
pub struct TelegramSink {
    client: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
    chat_id: String,
    timeout: Duration,
    summary_max_chars: usize,
}

impl TelegramSink {
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        config: &TelegramConfig,
        timeout: Duration,
        summary_max_chars: usize,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: SecretString::from(config.bot_token.expose_secret().to_owned()),
            chat_id: config.chat_id.clone(),
            timeout,
            summary_max_chars,
        }
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[async_trait]
impl Sink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, entry: &Entry) -> Result<(), SinkError> {
        let text = format_message(entry, self.summary_max_chars);
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
            disable_web_page_preview: false,
        };
        // Never log this URL: it embeds the bot token
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.bot_token.expose_secret()
        );

        let response = tokio::time::timeout(self.timeout, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| SinkError::NetworkFailed(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| SinkError::NetworkFailed(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let error_body: ApiErrorBody = tokio::time::timeout(self.timeout, response.json())
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();

        tracing::debug!(
            status = status.as_u16(),
            description = error_body.description.as_deref().unwrap_or(""),
            "Telegram API rejected message"
        );

        Err(match status.as_u16() {
            401 | 403 => SinkError::AuthFailed,
            429 => SinkError::RateLimited {
                retry_after: error_body
                    .parameters
                    .and_then(|p| p.retry_after)
                    .or(retry_after_header),
            },
            code => SinkError::NetworkFailed(match error_body.description {
                Some(description) => format!("HTTP status {}: {}", code, description),
                None => format!("HTTP status {}", code),
            }),
        })
    }
}

/// Renders an entry as a Telegram HTML message.
///
/// ```text
/// [Source] 📰 <b>Title</b>
///
/// 📝 Summary as plain text, truncated...
/// 🔗 https://example.com/article
/// ```
///
/// The summary is stripped of markup, truncated to `summary_max_chars` and,
/// if needed, further so the whole message fits [`TELEGRAM_MAX_MESSAGE_CHARS`].
/// Source label and title are capped; a link too long to fit is omitted.
/// All feed-supplied text is HTML-escaped.
pub fn format_message(entry: &Entry, summary_max_chars: usize) -> String {
    let source = truncate_chars(&clean_line(&entry.source_label), MAX_SOURCE_CHARS).into_owned();
    let title = match clean_line(&entry.title) {
        t if t.is_empty() => UNTITLED.to_string(),
        t => truncate_chars(&t, MAX_TITLE_CHARS).into_owned(),
    };
    let link = entry
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());
    let summary = entry
        .summary
        .as_deref()
        .map(summary_to_plain_text)
        .unwrap_or_default();

    let header = format!(
        "[{}] 📰 <b>{}</b>",
        html_escape::encode_text(&source),
        html_escape::encode_text(&title)
    );
    let mut used = header.chars().count();

    // A link that cannot fit is dropped rather than cut into a dead URL
    let link_line = link
        .map(|l| format!("🔗 {}", html_escape::encode_text(l)))
        .filter(|line| used + 1 + line.chars().count() <= TELEGRAM_MAX_MESSAGE_CHARS);
    if link.is_some() && link_line.is_none() {
        tracing::debug!(source = %source, "Link too long for a Telegram message, omitted");
    }
    if let Some(line) = &link_line {
        used += 1 + line.chars().count();
    }

    let mut parts = vec![header];
    if !summary.is_empty() {
        // Two newlines for the blank line plus the "📝 " prefix
        let budget = summary_max_chars.min(TELEGRAM_MAX_MESSAGE_CHARS.saturating_sub(used + 4));
        let summary = escaped_within(&summary, budget);
        if !summary.is_empty() {
            parts.push(String::new());
            parts.push(format!("📝 {}", summary));
        }
    }
    if let Some(line) = link_line {
        parts.push(line);
    }

    parts.join("\n")
}

/// Truncates `text` so that its HTML-escaped form is at most `budget` chars.
fn escaped_within(text: &str, budget: usize) -> String {
    let mut keep = budget;
    loop {
        let escaped = html_escape::encode_text(&truncate_chars(text, keep)).into_owned();
        let len = escaped.chars().count();
        if len <= budget || keep == 0 {
            return escaped;
        }
        keep = keep.saturating_sub(len - budget);
    }
}

fn clean_line(s: &str) -> String {
    crate::util::collapse_whitespace(&strip_control_chars(s))
}
