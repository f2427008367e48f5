//! SQLite connection pools for user state and the decision log.
//!
//! Both pools run in WAL mode so decision reads never wait behind the
//! emitter's inserts.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::DatabaseConfig;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to create pool: {0}")]
    PoolCreationFailed(#[source] sqlx::Error),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Failed to create directory: {0}")]
    DirectoryCreationFailed(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(3),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            ..Self::default()
        }
    }
}

/// Where a `sqlite:` URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    fn parse(database_url: &str) -> Self {
        let path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        let path = path.split('?').next().unwrap_or_default();

        if path.is_empty() || path == ":memory:" {
            Self::Memory
        } else {
            Self::File(PathBuf::from(path))
        }
    }

    fn ensure_parent_dir(&self) -> Result<(), ConnectionError> {
        let Self::File(path) = self else {
            return Ok(());
        };
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                std::fs::create_dir_all(parent).map_err(ConnectionError::DirectoryCreationFailed)
            }
            _ => Ok(()),
        }
    }
}

/// `sqlite:` URL for a database file path.
pub fn database_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{path}")
    }
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, ConnectionError> {
    Ok(SqliteConnectOptions::from_str(database_url)
        .map_err(|_| ConnectionError::InvalidDatabaseUrl(database_url.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal))
}

/// Open a pool on `database_url`, creating the file and its directory if missing.
pub async fn create_pool(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<SqlitePool, ConnectionError> {
    let config = config.unwrap_or_default();
    DatabaseLocation::parse(database_url).ensure_parent_dir()?;

    let options = connect_options(database_url)?
        .create_if_missing(true)
        .busy_timeout(config.busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(ConnectionError::PoolCreationFailed)
}

/// Single-connection in-memory pool; every call gets a fresh database.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(MEMORY_URL)?.shared_cache(true))
        .await
        .map_err(ConnectionError::PoolCreationFailed)
}

/// Whether `database_url` refers to an on-disk file that already exists.
pub fn database_exists(database_url: &str) -> bool {
    match DatabaseLocation::parse(database_url) {
        DatabaseLocation::Memory => false,
        DatabaseLocation::File(path) => path.exists(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url() {
        assert_eq!(database_url(".paygate/paygate.db"), "sqlite:.paygate/paygate.db");
        assert_eq!(database_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn test_location_parsing() {
        assert_eq!(DatabaseLocation::parse("sqlite::memory:"), DatabaseLocation::Memory);
        assert_eq!(
            DatabaseLocation::parse("sqlite:data/paygate.db?mode=rwc"),
            DatabaseLocation::File(PathBuf::from("data/paygate.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("sqlite:///tmp/paygate.db"),
            DatabaseLocation::File(PathBuf::from("/tmp/paygate.db"))
        );
    }

    #[tokio::test]
    async fn test_create_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("paygate.db");
        let url = database_url(&path.to_string_lossy());
        assert!(!database_exists(&url));

        let pool = create_pool(&url, Some(PoolConfig::from(&DatabaseConfig::default())))
            .await
            .unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(database_exists(&url));
    }
}
