//! Event Publishers

use async_trait::async_trait;
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::EventEnvelope;

/// Errors that can occur while publishing an event
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Publish timed out: {0}")]
    Timeout(String),

    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    #[error("Broken pipe: {0}")]
    BrokenPipe(String),

    #[error("No buffer space available: {0}")]
    BufferExhausted(String),

    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The sink answered with a non-success status
    #[error("Event sink rejected event with status {status}")]
    Rejected { status: u16 },

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl PublishError {
    /// Check if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishError::ConnectionRefused(_)
                | PublishError::ConnectionReset(_)
                | PublishError::Timeout(_)
                | PublishError::DnsResolution(_)
                | PublishError::BrokenPipe(_)
                | PublishError::BufferExhausted(_)
                | PublishError::NetworkUnreachable(_)
        )
    }

    /// Classify a transport failure by walking its source chain.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        let message = err.to_string();
        let mut current = Some(err);

        while let Some(cause) = current {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    ErrorKind::ConnectionRefused => return Self::ConnectionRefused(message),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                        return Self::ConnectionReset(message)
                    }
                    ErrorKind::TimedOut => return Self::Timeout(message),
                    ErrorKind::BrokenPipe => return Self::BrokenPipe(message),
                    _ => {}
                }
            }

            let text = cause.to_string();
            if text.contains("dns error") || text.contains("failed to lookup address") {
                return Self::DnsResolution(message);
            }
            if text.contains("Network is unreachable") {
                return Self::NetworkUnreachable(message);
            }
            if text.contains("No buffer space") {
                return Self::BufferExhausted(message);
            }

            current = cause.source();
        }

        Self::Transport(message)
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return PublishError::Timeout(err.to_string());
        }

        match PublishError::classify(&err) {
            PublishError::Transport(message) if err.is_connect() => {
                PublishError::ConnectionRefused(message)
            }
            classified => classified,
        }
    }
}

/// Sink for ledger events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event under its routing key
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError>;
}

pub type DynEventPublisher = Arc<dyn EventPublisher>;

/// Publishes events by POSTing the envelope to `<base_url>/<topic>`
#[derive(Debug, Clone)]
pub struct HttpEventPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEventPublisher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}", self.base_url, topic)
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let response = self
            .client
            .post(self.topic_url(topic))
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(topic, status = status.as_u16(), "Event delivered");
        Ok(())
    }
}

/// Writes events to the log instead of sending them anywhere
#[derive(Debug, Clone, Default)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let payload = serde_json::to_string(envelope)?;
        tracing::info!(topic, payload = %payload, "Event published");
        Ok(())
    }
}
