//! Delivery-channel publishers.

use std::time::Duration;

use async_trait::async_trait;
use ledgerline_core::event::PushEnvelope;
use ledgerline_shared::config::ChannelConfig;

/// Error types for publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The request could not be sent or timed out.
    #[error("Publish request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The channel answered with a non-success status.
    #[error("Channel rejected publish with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

/// Sends envelopes to the delivery channel and waits for acknowledgment.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one envelope. `Ok` means the channel acknowledged it.
    async fn publish(&self, envelope: &PushEnvelope) -> Result<(), PublishError>;
}

/// Publishes by POSTing the push envelope to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

const MAX_ERROR_BODY: usize = 512;

impl HttpPublisher {
    /// Creates a publisher for `url` with the given acknowledgment timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            auth_token,
        })
    }

    /// Builds a publisher from channel settings. Returns `None` when no push
    /// URL is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ChannelConfig) -> Result<Option<Self>, PublishError> {
        config
            .push_url
            .as_ref()
            .map(|url| {
                Self::new(
                    url.clone(),
                    config.auth_token.clone(),
                    Duration::from_millis(config.publish_timeout_ms),
                )
            })
            .transpose()
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, envelope: &PushEnvelope) -> Result<(), PublishError> {
        let mut request = self.client.post(&self.url).json(envelope);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(PublishError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Acknowledges every envelope without sending it.
///
/// Used when no channel is configured: records are marked SENT and the
/// direct processor does the posting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, envelope: &PushEnvelope) -> Result<(), PublishError> {
        tracing::trace!(message_id = %envelope.message.message_id, "No channel configured, skipping publish");
        Ok(())
    }
}
