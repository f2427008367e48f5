//! SQLite database adapters.

pub mod analytics_sink;
pub mod connection;
pub mod migrations;
pub mod user_state_repository;

pub use analytics_sink::SqliteAnalyticsSink;
pub use connection::{
    create_pool, create_test_pool, database_exists, database_url, ConnectionError, PoolConfig,
};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use user_state_repository::SqliteUserStateRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<&str>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(parse_datetime).transpose()
}

/// Parse an optional JSON column.
pub fn parse_optional_json<T: serde::de::DeserializeOwned>(s: Option<&str>) -> DomainResult<Option<T>> {
    s.map(serde_json::from_str::<T>)
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Convert a stored integer counter, rejecting negative or oversized values.
pub fn parse_counter(column: &str, value: i64) -> DomainResult<u32> {
    u32::try_from(value)
        .map_err(|_| DomainError::SerializationError(format!("{column} out of range: {value}")))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Open (creating if needed) the database at `database_url` and migrate it.
pub async fn initialize_database(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
