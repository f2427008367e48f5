//! Project initialization and engine wiring.
//!
//! Handles:
//! - Configuration directory and default config file creation
//! - Database creation and migrations
//! - Building a `DecisionEngine` from a loaded `Config`

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::adapters::http::HttpAnalyticsSink;
use crate::adapters::memory::InMemoryAnalyticsSink;
use crate::adapters::sqlite::{
    database_exists, database_url, initialize_database, PoolConfig, SqliteAnalyticsSink, SqliteUserStateRepository,
};
use crate::domain::models::{Config, SinkKind};
use crate::domain::ports::AnalyticsSink;
use crate::infrastructure::config::PROJECT_DIR;
use crate::services::{ConversionEventEmitter, DecisionEngine};

/// Default configuration template content
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Paygate Configuration
# Override settings by editing this file, adding .paygate/local.yaml, or
# setting environment variables with the PAYGATE_ prefix.
#
# Example environment variables:
#   export PAYGATE_ENGINE__TRIAL_DURATION_DAYS=14
#   export PAYGATE_SINK__KIND=http
#   export PAYGATE_SINK__ENDPOINT=https://collector.example.com/events
#   export PAYGATE_LOGGING__LEVEL=debug

engine:
  trial_duration_days: 7
  engagement_high_duration_sec: 300
  engagement_high_actions: 10
  engagement_medium_duration_sec: 120
  engagement_medium_actions: 5
  offer_cooldown_days: 7
  offer_lifetime_hours: 48
  paywall_repeat_cooldown_hours: 24
  experiment_variant_count: 2
  offer_discount_percent: 30
  offer_min_sessions: 3
  export_intent_threshold: 2
  save_intent_threshold: 3
  paywall_experiment_id: "paywall_v1"
  # Deadline for a whole decision, including retries and saves
  decision_budget_ms: 50
  # Engagement sessions idle this long are dropped
  session_idle_timeout_secs: 1800
  max_conflict_retries: 3

# Conversion event delivery
emitter:
  queue_capacity: 1024
  max_attempts: 5
  initial_backoff_ms: 200
  max_backoff_ms: 10000

database:
  path: ".paygate/paygate.db"
  max_connections: 5

# Analytics sink: memory, sqlite or http
sink:
  kind: "sqlite"
  timeout_secs: 5

logging:
  # Log level: trace, debug, info, warn, error
  level: "info"
  # Log format: json, pretty
  format: "pretty"
  # Rotation for files under log_dir: daily, hourly, never
  rotation: "daily"
"#;

/// Paths used by a project-local installation
#[derive(Debug, Clone)]
pub struct SetupPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub database_file: PathBuf,
    pub log_dir: PathBuf,
}

impl SetupPaths {
    pub fn new(root: &Path) -> Self {
        let config_dir = root.join(PROJECT_DIR);
        Self {
            config_file: config_dir.join("config.yaml"),
            database_file: config_dir.join("paygate.db"),
            log_dir: config_dir.join("logs"),
            config_dir,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file.exists()
    }
}

/// Create the project directories. Returns the ones that did not exist yet.
pub fn create_config_dir(paths: &SetupPaths) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in [&paths.config_dir, &paths.log_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            created.push(dir.clone());
        }
    }
    Ok(created)
}

/// Write the default config file unless one exists and `force` is unset.
pub fn create_config_file(paths: &SetupPaths, force: bool) -> Result<bool> {
    if paths.config_file.exists() && !force {
        return Ok(false);
    }
    fs::write(&paths.config_file, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", paths.config_file.display()))?;
    Ok(true)
}

/// Create and migrate the project database. Returns whether the file is new.
pub async fn run_migrations(paths: &SetupPaths) -> Result<bool> {
    let url = database_url(&paths.database_file.to_string_lossy());
    let created = !database_exists(&url);
    let pool = initialize_database(&url, None)
        .await
        .context("Failed to initialize database")?;
    pool.close().await;
    Ok(created)
}

/// Build the analytics sink selected by `config.sink`.
pub fn build_sink(config: &Config, pool: &sqlx::SqlitePool) -> Result<Arc<dyn AnalyticsSink>> {
    let sink: Arc<dyn AnalyticsSink> = match config.sink.kind {
        SinkKind::Memory => Arc::new(InMemoryAnalyticsSink::new()),
        SinkKind::Sqlite => Arc::new(SqliteAnalyticsSink::new(pool.clone())),
        SinkKind::Http => {
            let endpoint = config
                .sink
                .endpoint
                .clone()
                .context("sink.endpoint is required for the http sink")?;
            Arc::new(HttpAnalyticsSink::new(
                endpoint,
                Duration::from_secs(config.sink.timeout_secs),
            )?)
        }
    };
    Ok(sink)
}

/// Open the configured database and assemble a running engine.
///
/// Must be called inside a Tokio runtime: the emitter worker is spawned here.
pub async fn build_engine(config: &Config) -> Result<DecisionEngine> {
    let url = database_url(&config.database.path);
    let pool = initialize_database(
        &url,
        Some(PoolConfig::from(&config.database)),
    )
    .await
    .context("Failed to open database. Run 'paygate init' first.")?;

    let repository = Arc::new(SqliteUserStateRepository::new(pool.clone()));
    let sink = build_sink(config, &pool)?;
    let emitter = ConversionEventEmitter::spawn(sink, &config.emitter);

    info!(
        database = %config.database.path,
        sink = ?config.sink.kind,
        "decision engine ready"
    );
    Ok(DecisionEngine::new(config.engine.clone(), repository, emitter))
}
