//! HTTP adapters.

pub mod analytics_sink;

pub use analytics_sink::{HttpAnalyticsSink, IDEMPOTENCY_HEADER};
