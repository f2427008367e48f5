use anyhow::{Context, Result};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::{Config, SinkKind};

/// Project directory holding config, database and logs.
pub const PROJECT_DIR: &str = ".paygate";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid {0}: must be at least 1")]
    ZeroValue(&'static str),

    #[error("Invalid offer_discount_percent: {0}. Must be between 1 and 100")]
    InvalidDiscount(u8),

    #[error(
        "Invalid engagement thresholds: medium ({0}s, {1} actions) must not exceed high ({2}s, {3} actions)"
    )]
    InvalidEngagementThresholds(u64, u32, u64, u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("The http sink requires sink.endpoint")]
    MissingSinkEndpoint,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty"];
const LOG_ROTATIONS: &[&str] = &["daily", "hourly", "never"];

fn one_of(
    value: &str,
    allowed: &[&str],
    invalid: fn(String) -> ConfigError,
) -> Result<(), ConfigError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(value.to_string()))
    }
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Field defaults (serde)
    /// 2. .paygate/config.yaml (project config, created by init)
    /// 3. .paygate/local.yaml (project local overrides, optional)
    /// 4. Environment variables (`PAYGATE_*` prefix, `__` separates sections)
    ///
    /// Defaults are not merged as a provider: a serialized default under the
    /// snake_case key would collide with a camelCase key from a file.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Yaml::file(Path::new(PROJECT_DIR).join("config.yaml")))
            .merge(Yaml::file(Path::new(PROJECT_DIR).join("local.yaml")))
            .merge(Env::prefixed("PAYGATE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("PAYGATE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let engine = &config.engine;

        for (name, value) in [
            ("trial_duration_days", engine.trial_duration_days),
            ("experiment_variant_count", engine.experiment_variant_count),
            ("offer_lifetime_hours", engine.offer_lifetime_hours),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue(name));
            }
        }

        for (name, value) in [
            ("decision_budget_ms", engine.decision_budget_ms),
            ("session_idle_timeout_secs", engine.session_idle_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue(name));
            }
        }

        if engine.offer_discount_percent == 0 || engine.offer_discount_percent > 100 {
            return Err(ConfigError::InvalidDiscount(engine.offer_discount_percent));
        }

        if engine.engagement_medium_duration_sec > engine.engagement_high_duration_sec
            || engine.engagement_medium_actions > engine.engagement_high_actions
        {
            return Err(ConfigError::InvalidEngagementThresholds(
                engine.engagement_medium_duration_sec,
                engine.engagement_medium_actions,
                engine.engagement_high_duration_sec,
                engine.engagement_high_actions,
            ));
        }

        if engine.paywall_experiment_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "paywall_experiment_id cannot be empty".to_string(),
            ));
        }

        // Emitter
        if config.emitter.queue_capacity == 0 {
            return Err(ConfigError::ZeroValue("queue_capacity"));
        }
        if config.emitter.max_attempts == 0 {
            return Err(ConfigError::ZeroValue("max_attempts"));
        }
        if config.emitter.initial_backoff_ms > config.emitter.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.emitter.initial_backoff_ms,
                config.emitter.max_backoff_ms,
            ));
        }

        // Database
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::ZeroValue("max_connections"));
        }

        // Sink
        if config.sink.kind == SinkKind::Http
            && config.sink.endpoint.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingSinkEndpoint);
        }

        // Logging
        let logging = &config.logging;
        one_of(&logging.level, LOG_LEVELS, ConfigError::InvalidLogLevel)?;
        one_of(&logging.format, LOG_FORMATS, ConfigError::InvalidLogFormat)?;
        one_of(&logging.rotation, LOG_ROTATIONS, ConfigError::InvalidRotation)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.database.path, ".paygate/paygate.db");
        assert_eq!(config.sink.kind, SinkKind::Sqlite);
        assert_eq!(config.emitter.queue_capacity, 1024);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_load_from_file_merges_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            r"
engine:
  trialDurationDays: 14
  offer_cooldown_days: 10
sink:
  kind: memory
logging:
  level: debug
",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.engine.trial_duration_days, 14);
        assert_eq!(config.engine.offer_cooldown_days, 10);
        assert_eq!(config.engine.offer_lifetime_hours, 48);
        assert_eq!(config.sink.kind, SinkKind::Memory);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "engine:\n  paywall_repeat_cooldown_hours: 12\n").unwrap();

        temp_env::with_vars(
            [
                ("PAYGATE_ENGINE__PAYWALL_REPEAT_COOLDOWN_HOURS", Some("6")),
                ("PAYGATE_EMITTER__MAX_ATTEMPTS", Some("2")),
            ],
            || {
                let config = ConfigLoader::load_from_file(&path).unwrap();
                assert_eq!(config.engine.paywall_repeat_cooldown_hours, 6);
                assert_eq!(config.emitter.max_attempts, 2);
            },
        );
    }

    #[test]
    fn test_validate_rejects_zero_variants() {
        let mut config = Config::default();
        config.engine.experiment_variant_count = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroValue("experiment_variant_count"))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_idle_timeout() {
        let mut config = Config::default();
        config.engine.session_idle_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroValue("session_idle_timeout_secs"))
        ));
    }

    #[test]
    fn test_validate_engagement_ordering() {
        let mut config = Config::default();
        config.engine.engagement_medium_actions = 20;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidEngagementThresholds(120, 20, 300, 10))
        ));
    }

    #[test]
    fn test_validate_discount_range() {
        let mut config = Config::default();
        config.engine.offer_discount_percent = 101;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidDiscount(101))
        ));
    }

    #[test]
    fn test_validate_backoff() {
        let mut config = Config::default();
        config.emitter.initial_backoff_ms = 20_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(20_000, 10_000))
        ));
    }

    #[test]
    fn test_validate_http_sink_needs_endpoint() {
        let mut config = Config::default();
        config.sink.kind = SinkKind::Http;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingSinkEndpoint)
        ));

        config.sink.endpoint = Some("http://collector.local/events".to_string());
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }
}
