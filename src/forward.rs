//! Best-effort delivery to the downstream inbox.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::envelope::NormalizedMessage;
use crate::error::ForwardError;

/// Bound on a single inbox POST. A slow downstream delays the current
/// batch but can never grow an internal queue.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts normalized messages to the internal inbox endpoint.
///
/// Delivery is at-most-once: any failure (network, non-2xx) is logged and
/// the message is dropped. The poll loop is never blocked beyond the
/// request timeout and never sees an error.
pub struct InboxForwarder {
    inbox_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl InboxForwarder {
    pub fn new(inbox_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            inbox_url: inbox_url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    pub fn inbox_url(&self) -> &str {
        &self.inbox_url
    }

    /// Post one message. Failures are logged at warn and swallowed.
    pub async fn forward(&self, message: &NormalizedMessage) {
        if let Err(e) = self.try_forward(message).await {
            tracing::warn!(
                from = message.from.as_deref().unwrap_or("unknown"),
                "Inbox forward failed: {e}"
            );
        }
    }

    async fn try_forward(&self, message: &NormalizedMessage) -> Result<(), ForwardError> {
        let resp = self
            .client
            .post(&self.inbox_url)
            .bearer_auth(self.token.expose_secret())
            .json(message)
            .timeout(FORWARD_TIMEOUT)
            .send()
            .await
            .map_err(|e| ForwardError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ForwardError::Status {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
