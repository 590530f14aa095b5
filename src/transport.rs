//! Messaging backend client — long-poll receive and send passthrough.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::TransportError;

/// Client-side headroom on top of the backend's own long-poll window, so
/// the backend gets to answer 204 itself before our deadline fires.
const RECEIVE_HEADROOM_SECS: u64 = 10;

/// Bound on outbound send calls.
const SEND_TIMEOUT_SECS: u64 = 10;

/// Result of one receive call.
#[derive(Debug)]
pub enum Received {
    /// The backend answered with a batch of envelopes. May be empty.
    Batch(Vec<Envelope>),
    /// The backend's long-poll window expired with no messages (204).
    NoContent,
}

/// Raw backend response to a send, relayed verbatim to the notify caller.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Transport seam over the messaging backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Long-poll for new envelopes, blocking server-side up to
    /// `timeout_secs`.
    async fn receive(&self, timeout_secs: u64) -> Result<Received, TransportError>;

    /// Send a message. No retry; the raw outcome (2xx or not) is returned
    /// for the caller to relay.
    async fn send(
        &self,
        to: &str,
        message: &str,
        attachments: Option<&[String]>,
    ) -> Result<SendOutcome, TransportError>;
}

/// HTTP implementation against a signal-cli-rest-api style backend.
pub struct HttpTransport {
    base: String,
    number: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            number: number.into(),
            client: reqwest::Client::new(),
        }
    }

    fn receive_url(&self, timeout_secs: u64) -> String {
        format!(
            "{}/v1/receive/{}?timeout={timeout_secs}",
            self.base.trim_end_matches('/'),
            self.number
        )
    }

    fn send_url(&self) -> String {
        format!("{}/v2/send", self.base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn receive(&self, timeout_secs: u64) -> Result<Received, TransportError> {
        let resp = self
            .client
            .get(self.receive_url(timeout_secs))
            .timeout(Duration::from_secs(timeout_secs + RECEIVE_HEADROOM_SECS))
            .send()
            .await
            .map_err(classify)?;

        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Received::NoContent);
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::InvalidBody(e.to_string()))?;

        match body {
            Value::Array(items) => Ok(Received::Batch(
                items.into_iter().map(Envelope::new).collect(),
            )),
            other => {
                // The backend contract is a JSON array; anything else is
                // ignored rather than treated as a failure.
                tracing::debug!("receive returned non-array body: {other}");
                Ok(Received::Batch(Vec::new()))
            }
        }
    }

    async fn send(
        &self,
        to: &str,
        message: &str,
        attachments: Option<&[String]>,
    ) -> Result<SendOutcome, TransportError> {
        let mut body = serde_json::json!({
            "number": self.number,
            "recipients": [to],
            "message": message,
        });
        if let Some(atts) = attachments {
            body["attachments"] = serde_json::json!(atts);
        }

        let resp = self
            .client
            .post(self.send_url())
            .json(&body)
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = resp.text().await.unwrap_or_default();

        Ok(SendOutcome {
            status,
            content_type,
            body,
        })
    }
}

/// Distinguish an expired long-poll deadline from real transport failures.
fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(e.to_string())
    }
}
