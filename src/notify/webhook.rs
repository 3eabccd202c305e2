use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{Sink, SinkError};
use crate::feed::Entry;

/// POSTs each entry as JSON to a fixed URL.
#[derive(Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, url: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: url.to_string(),
            timeout,
        }
    }
}

/// JSON body sent to the webhook.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookPayload<'a> {
    pub title: &'a str,
    pub link: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub source: &'a str,
}

impl<'a> From<&'a Entry> for WebhookPayload<'a> {
    fn from(entry: &'a Entry) -> Self {
        Self {
            title: &entry.title,
            link: entry.link.as_deref(),
            summary: entry.summary.as_deref(),
            source: &entry.source_label,
        }
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, entry: &Entry) -> Result<(), SinkError> {
        let payload = WebhookPayload::from(entry);

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::NetworkFailed(format!("timed out after {:?}", self.timeout))
                } else {
                    // Webhook URLs often embed a secret token
                    SinkError::NetworkFailed(e.without_url().to_string())
                }
            })?;

        if let Err(e) = response.error_for_status_ref() {
            tracing::debug!(status = e.status().map(|s| s.as_u16()), "Webhook rejected entry");
            return Err(SinkError::RejectedByServer(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry() -> Entry {
        Entry {
            title: "Release notes".to_string(),
            link: Some("https://example.com/notes".to_string()),
            summary: None,
            published: Some(1_700_000_000),
            source_label: "Example Blog".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "title": "Release notes",
                "link": "https://example.com/notes",
                "summary": null,
                "source": "Example Blog"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookSink::new(
            reqwest::Client::new(),
            &format!("{}/hook", server.uri()),
            Duration::from_secs(5),
        );
        sink.send(&entry()).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_2xx_is_rejected_by_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookSink::new(reqwest::Client::new(), &server.uri(), Duration::from_secs(5));
        let err = sink.send(&entry()).await.unwrap_err();
        assert_eq!(err, SinkError::RejectedByServer(500));
    }

    #[tokio::test]
    async fn test_slow_endpoint_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let sink = WebhookSink::new(
            reqwest::Client::new(),
            &server.uri(),
            Duration::from_millis(200),
        );
        let err = sink.send(&entry()).await.unwrap_err();
        assert!(matches!(err, SinkError::NetworkFailed(_)));
    }

    #[tokio::test]
    async fn test_network_error_does_not_leak_url() {
        let sink = WebhookSink::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/hooks/s3cr3t-token",
            Duration::from_secs(5),
        );
        match sink.send(&entry()).await.unwrap_err() {
            SinkError::NetworkFailed(msg) => assert!(!msg.contains("s3cr3t-token")),
            other => panic!("Expected NetworkFailed, got {:?}", other),
        }
    }
}
