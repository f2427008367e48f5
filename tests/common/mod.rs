//! Common test utilities for integration tests
//!
//! Provides engine fixtures wired to in-memory or `SQLite` adapters.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use paygate::adapters::memory::{InMemoryAnalyticsSink, InMemoryUserStateRepository};
use paygate::adapters::sqlite::{
    create_migrated_test_pool, SqliteAnalyticsSink, SqliteUserStateRepository,
};
use paygate::services::RetryPolicy;
use paygate::{
    ConversionEventEmitter, DecisionEngine, EngineSettings, UserActionEvent, UserStateRepository,
};
use sqlx::SqlitePool;

/// Fixed reference instant for deterministic scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
}

pub fn at(offset: Duration) -> DateTime<Utc> {
    t0() + offset
}

pub fn event(user: &str, session: &str, action: &str, at: DateTime<Utc>) -> UserActionEvent {
    UserActionEvent::new(user, session, action, at)
}

/// Retry quickly so tests never wait on backoff.
pub fn fast_emitter(sink: Arc<dyn paygate::AnalyticsSink>) -> ConversionEventEmitter {
    ConversionEventEmitter::with_policy(sink, RetryPolicy::new(3, 1, 5), 256)
}

pub struct MemoryFixture {
    pub engine: DecisionEngine,
    pub repository: Arc<InMemoryUserStateRepository>,
    pub sink: Arc<InMemoryAnalyticsSink>,
}

pub fn memory_engine(settings: EngineSettings) -> MemoryFixture {
    let repository = Arc::new(InMemoryUserStateRepository::new());
    let sink = Arc::new(InMemoryAnalyticsSink::new());
    let engine = DecisionEngine::new(settings, repository.clone(), fast_emitter(sink.clone()));
    MemoryFixture {
        engine,
        repository,
        sink,
    }
}

/// Engine over an arbitrary repository, emitting into memory.
pub fn engine_with_repository(
    settings: EngineSettings,
    repository: Arc<dyn UserStateRepository>,
) -> (DecisionEngine, Arc<InMemoryAnalyticsSink>) {
    let sink = Arc::new(InMemoryAnalyticsSink::new());
    let engine = DecisionEngine::new(settings, repository, fast_emitter(sink.clone()));
    (engine, sink)
}

pub struct SqliteFixture {
    pub engine: DecisionEngine,
    pub pool: SqlitePool,
    pub sink: Arc<SqliteAnalyticsSink>,
}

pub async fn sqlite_engine(settings: EngineSettings) -> SqliteFixture {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test pool");
    let repository = Arc::new(SqliteUserStateRepository::new(pool.clone()));
    let sink = Arc::new(SqliteAnalyticsSink::new(pool.clone()));
    let engine = DecisionEngine::new(settings, repository, fast_emitter(sink.clone()));
    SqliteFixture { engine, pool, sink }
}

/// Drive `user` through `sessions` earlier sessions, one `other` action each.
///
/// The first of these creates the user's record.
pub async fn warm_up(engine: &DecisionEngine, user: &str, sessions: u32) {
    for n in 0..sessions {
        let session = format!("{user}-warmup-{n}");
        engine
            .evaluate(event(user, &session, "other", at(Duration::hours(i64::from(n)))))
            .await;
    }
}

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
