//! Port trait definitions (Hexagonal Architecture)
//!
//! - `UserStateRepository`: versioned per-user record storage
//! - `AnalyticsSink`: delivery target for conversion events
//!
//! The services depend only on these traits; adapters provide in-memory,
//! SQLite and HTTP implementations.

pub mod analytics_sink;
pub mod user_state_repository;

pub use analytics_sink::{AnalyticsSink, SinkError};
pub use user_state_repository::UserStateRepository;
