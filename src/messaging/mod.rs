//! Message-bus publishing seam
//!
//! The bus client itself lives outside this crate. The poller only needs a
//! fire-and-forget `publish`; a failed publish is logged and otherwise ignored.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, MessagingError>;

pub trait MessagePublisher: Send + Sync {
    /// Publish `payload` on `topic`; `retained` asks the broker to keep it for late subscribers
    fn publish(&self, topic: &str, payload: &str, retained: bool) -> Result<()>;
}

/// Publisher that only emits tracing events, for running without a bus
#[derive(Debug, Clone, Default)]
pub struct TracingPublisher;

impl TracingPublisher {
    pub fn new() -> Self {
        Self
    }
}

impl MessagePublisher for TracingPublisher {
    fn publish(&self, topic: &str, payload: &str, retained: bool) -> Result<()> {
        tracing::debug!(topic, retained, payload, "Publish");
        Ok(())
    }
}

/// Publisher that keeps everything it was given
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: std::sync::Arc<std::sync::Mutex<Vec<Published>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl MessagePublisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str, retained: bool) -> Result<()> {
        let mut published = self
            .published
            .lock()
            .map_err(|e| MessagingError::PublishFailed(e.to_string()))?;
        published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retained,
        });
        Ok(())
    }
}
