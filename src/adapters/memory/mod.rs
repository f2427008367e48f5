//! Process-local adapters used by tests and dry runs.

pub mod analytics_sink;
pub mod user_state_repository;

pub use analytics_sink::InMemoryAnalyticsSink;
pub use user_state_repository::InMemoryUserStateRepository;
