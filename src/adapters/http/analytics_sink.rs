//! HTTP collector sink.
//!
//! Each event is POSTed as JSON with an `Idempotency-Key` header so the
//! collector can discard redeliveries.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use tracing::{debug, instrument};

use crate::domain::models::ConversionEvent;
use crate::domain::ports::{AnalyticsSink, SinkError};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Delivers conversion events to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpAnalyticsSink {
    http_client: ReqwestClient,
    endpoint: String,
}

impl HttpAnalyticsSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 2xx and 409 (already stored) are success; 429 and 5xx may succeed later.
fn classify_status(status: StatusCode, body: String) -> Result<(), SinkError> {
    if status.is_success() || status == StatusCode::CONFLICT {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(SinkError::Unavailable(format!("{status}: {body}")))
    } else {
        Err(SinkError::Rejected(format!("{status}: {body}")))
    }
}

#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    #[instrument(skip(self, event), fields(event_id = %event.event_id(), kind = event.kind()))]
    async fn deliver(&self, event: &ConversionEvent) -> Result<(), SinkError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header(IDEMPOTENCY_HEADER, event.dedup_key())
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout
                } else {
                    SinkError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        debug!(%status, "collector responded");
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        classify_status(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::ACCEPTED, String::new()).is_ok());
        assert!(classify_status(StatusCode::CONFLICT, String::new()).is_ok());

        let throttled = classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).unwrap_err();
        assert!(throttled.is_transient());
        let outage = classify_status(StatusCode::BAD_GATEWAY, String::new()).unwrap_err();
        assert!(outage.is_transient());

        let bad = classify_status(StatusCode::UNPROCESSABLE_ENTITY, "missing userId".into())
            .unwrap_err();
        assert!(!bad.is_transient());
        assert!(bad.to_string().contains("missing userId"));
    }
}
