use crate::config::FeedSource;
use crate::feed::parser::{parse_feed, Entry, ParseResult};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Content types that can never hold a feed document.
const REJECTED_CONTENT_TYPES: &[&str] = &["image/", "audio/", "video/", "font/"];

/// Errors that can occur while retrieving and parsing one feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Body was not a parseable RSS/Atom/JSON feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server declared a media type that is not a feed
    #[error("Unexpected content type: {0}")]
    UnexpectedContentType(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// A feed that could not be fetched, tagged with its URL.
#[derive(Debug, Error)]
#[error("Failed to fetch {url}: {source}")]
pub struct FetchFailed {
    pub url: String,
    #[source]
    pub source: FetchError,
}

/// Per-feed fetch settings.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Covers the whole exchange: connect, headers and body.
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_body_bytes: MAX_FEED_SIZE,
        }
    }
}

/// Outcome of fetching one configured feed.
#[derive(Debug)]
pub struct FeedOutcome {
    pub url: String,
    pub result: Result<Vec<Entry>, FetchFailed>,
}

/// Fetches every configured feed with bounded parallelism.
///
/// At most `concurrency` downloads are in flight at once. Outcomes are
/// returned in the same order as `sources`, regardless of completion order.
/// A failing feed yields an `Err` outcome and never affects the others.
pub async fn fetch_all(
    client: &reqwest::Client,
    sources: &[FeedSource],
    concurrency: usize,
    options: FetchOptions,
) -> Vec<FeedOutcome> {
    stream::iter(sources)
        .map(move |source| async move {
            let result = fetch(client, &source.url, options).await;
            match &result {
                Ok(entries) => {
                    tracing::debug!(feed = %source.url, entries = entries.len(), "Fetched feed");
                }
                Err(e) => {
                    tracing::warn!(feed = %source.url, error = %e.source, "Feed fetch failed, skipping");
                }
            }
            FeedOutcome {
                url: source.url.clone(),
                result,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Retrieves one feed and parses it into entries in document order.
///
/// # Errors
///
/// The returned [`FetchFailed`] wraps one of:
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - The exchange exceeded `options.timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::UnexpectedContentType`] - Image, audio, video or font body
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `options.max_body_bytes`
/// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
/// - [`FetchError::Parse`] - Invalid RSS/Atom
///
/// There is no retry: a failed feed is simply tried again on the next run.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    options: FetchOptions,
) -> Result<Vec<Entry>, FetchFailed> {
    fetch_entries(client, url, options)
        .await
        .map_err(|source| FetchFailed {
            url: url.to_string(),
            source,
        })
}

async fn fetch_entries(
    client: &reqwest::Client,
    url: &str,
    options: FetchOptions,
) -> Result<Vec<Entry>, FetchError> {
    let bytes = tokio::time::timeout(options.timeout, download(client, url, options.max_body_bytes))
        .await
        .map_err(|_| FetchError::Timeout(options.timeout))??;

    let ParseResult { entries, skipped } =
        parse_feed(&bytes, url).map_err(|e| FetchError::Parse(e.to_string()))?;

    if skipped > 0 {
        tracing::warn!(
            feed = %url,
            skipped = skipped,
            "Entries without link, title or summary skipped"
        );
    }

    Ok(entries)
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        let lowered = content_type.to_ascii_lowercase();
        if REJECTED_CONTENT_TYPES.iter().any(|p| lowered.starts_with(p)) {
            return Err(FetchError::UnexpectedContentType(content_type.to_string()));
        }
    }

    read_limited_bytes(response, limit).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
