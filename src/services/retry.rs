//! Exponential backoff for analytics delivery.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::EmitterConfig;
use crate::domain::ports::SinkError;

/// Retry policy for transient sink failures.
///
/// Backoff doubles with each retry starting at `initial_backoff_ms`, capped
/// at `max_backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }
}

impl From<&EmitterConfig> for RetryPolicy {
    fn from(config: &EmitterConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }
}

/// Final state of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, SinkError>,
    /// Attempts made, at least 1
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }

    const fn should_retry(&self, err: &SinkError, attempts: u32) -> bool {
        err.is_transient() && attempts < self.max_attempts
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SinkError>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(attempts, "delivery succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) if self.should_retry(&err, attempts) => {
                    let backoff = self.calculate_backoff(attempts - 1);
                    warn!(
                        attempt = attempts,
                        error = %err,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "transient delivery failure, retrying"
                    );
                    sleep(backoff).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(attempts, error = %err, "delivery failed after all attempts");
                    } else {
                        debug!(error = %err, "permanent delivery failure, not retrying");
                    }
                    return RetryOutcome {
                        result: Err(err),
                        attempts,
                    };
                }
            }
        }
    }
}
