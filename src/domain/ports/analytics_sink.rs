//! Port for the external analytics sink.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::ConversionEvent;

/// Delivery failure reported by an analytics sink.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Sink request timed out")]
    Timeout,

    #[error("Sink rejected event: {0}")]
    Rejected(String),

    #[error("Sink storage error: {0}")]
    Storage(String),
}

impl SinkError {
    /// Whether a retry may succeed.
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Destination for decision and outcome events.
///
/// Delivery is at-least-once; the sink deduplicates on `event.dedup_key()`.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn deliver(&self, event: &ConversionEvent) -> Result<(), SinkError>;
}
