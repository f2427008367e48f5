use serde::{Deserialize, Serialize};

/// Main configuration structure for Paygate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Decision engine thresholds and budgets
    #[serde(default)]
    pub engine: EngineSettings,

    /// Conversion event emitter queue and retry policy
    #[serde(default)]
    pub emitter: EmitterConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Analytics sink configuration
    #[serde(default)]
    pub sink: SinkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Decision engine settings.
///
/// The first nine fields are the engine's recognized options and also accept
/// their camelCase spelling (`trialDurationDays`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineSettings {
    /// Trial length fixed at trial start
    #[serde(default = "default_trial_duration_days", alias = "trialDurationDays")]
    pub trial_duration_days: u32,

    /// Minimum session duration for `high` engagement
    #[serde(
        default = "default_engagement_high_duration_sec",
        alias = "engagementHighDurationSec"
    )]
    pub engagement_high_duration_sec: u64,

    /// Minimum session actions for `high` engagement
    #[serde(default = "default_engagement_high_actions", alias = "engagementHighActions")]
    pub engagement_high_actions: u32,

    /// Minimum session duration for `medium` engagement
    #[serde(
        default = "default_engagement_medium_duration_sec",
        alias = "engagementMediumDurationSec"
    )]
    pub engagement_medium_duration_sec: u64,

    /// Minimum session actions for `medium` engagement
    #[serde(
        default = "default_engagement_medium_actions",
        alias = "engagementMediumActions"
    )]
    pub engagement_medium_actions: u32,

    /// Minimum interval between two granted offers
    #[serde(default = "default_offer_cooldown_days", alias = "offerCooldownDays")]
    pub offer_cooldown_days: u32,

    /// How long a granted offer stays redeemable
    #[serde(default = "default_offer_lifetime_hours", alias = "offerLifetimeHours")]
    pub offer_lifetime_hours: u32,

    /// Minimum interval between two shown paywalls for the same user
    #[serde(
        default = "default_paywall_repeat_cooldown_hours",
        alias = "paywallRepeatCooldownHours"
    )]
    pub paywall_repeat_cooldown_hours: u32,

    /// Number of variants of the paywall experiment
    #[serde(default = "default_experiment_variant_count", alias = "experimentVariantCount")]
    pub experiment_variant_count: u32,

    /// Discount granted by a retention offer (1-100)
    #[serde(default = "default_offer_discount_percent")]
    pub offer_discount_percent: u8,

    /// Sessions a user must have recorded before an offer is granted
    #[serde(default = "default_offer_min_sessions")]
    pub offer_min_sessions: u32,

    /// Exports observed before an export may trigger the paywall
    #[serde(default = "default_export_intent_threshold")]
    pub export_intent_threshold: u32,

    /// Saved items before a save may trigger the paywall
    #[serde(default = "default_save_intent_threshold")]
    pub save_intent_threshold: u32,

    /// Experiment identifier used for paywall variant assignment
    #[serde(default = "default_paywall_experiment_id")]
    pub paywall_experiment_id: String,

    /// Deadline for a whole decision: lock, loads, retries and saves
    #[serde(default = "default_decision_budget_ms")]
    pub decision_budget_ms: u64,

    /// Session counters untouched for this long are discarded
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// Optimistic write retries before falling back to no-show
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

const fn default_trial_duration_days() -> u32 {
    7
}

const fn default_engagement_high_duration_sec() -> u64 {
    300
}

const fn default_engagement_high_actions() -> u32 {
    10
}

const fn default_engagement_medium_duration_sec() -> u64 {
    120
}

const fn default_engagement_medium_actions() -> u32 {
    5
}

const fn default_offer_cooldown_days() -> u32 {
    7
}

const fn default_offer_lifetime_hours() -> u32 {
    48
}

const fn default_paywall_repeat_cooldown_hours() -> u32 {
    24
}

const fn default_experiment_variant_count() -> u32 {
    2
}

const fn default_offer_discount_percent() -> u8 {
    30
}

const fn default_offer_min_sessions() -> u32 {
    3
}

const fn default_export_intent_threshold() -> u32 {
    2
}

const fn default_save_intent_threshold() -> u32 {
    3
}

fn default_paywall_experiment_id() -> String {
    "paywall_v1".to_string()
}

const fn default_decision_budget_ms() -> u64 {
    50
}

const fn default_session_idle_timeout_secs() -> u64 {
    1800
}

const fn default_max_conflict_retries() -> u32 {
    3
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            trial_duration_days: default_trial_duration_days(),
            engagement_high_duration_sec: default_engagement_high_duration_sec(),
            engagement_high_actions: default_engagement_high_actions(),
            engagement_medium_duration_sec: default_engagement_medium_duration_sec(),
            engagement_medium_actions: default_engagement_medium_actions(),
            offer_cooldown_days: default_offer_cooldown_days(),
            offer_lifetime_hours: default_offer_lifetime_hours(),
            paywall_repeat_cooldown_hours: default_paywall_repeat_cooldown_hours(),
            experiment_variant_count: default_experiment_variant_count(),
            offer_discount_percent: default_offer_discount_percent(),
            offer_min_sessions: default_offer_min_sessions(),
            export_intent_threshold: default_export_intent_threshold(),
            save_intent_threshold: default_save_intent_threshold(),
            paywall_experiment_id: default_paywall_experiment_id(),
            decision_budget_ms: default_decision_budget_ms(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

/// Conversion event emitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmitterConfig {
    /// Capacity of the local delivery queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delivery attempts per event before it is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_queue_capacity() -> usize {
    1024
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".paygate/paygate.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Where conversion events are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Keep events in process memory
    Memory,
    /// Store events in the local database
    #[default]
    Sqlite,
    /// POST events to an HTTP collector
    Http,
}

/// Analytics sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SinkConfig {
    /// Sink implementation
    #[serde(default)]
    pub kind: SinkKind,

    /// Collector URL, required for the http sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Request timeout in seconds for the http sink
    #[serde(default = "default_sink_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_sink_timeout_secs() -> u64 {
    5
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            endpoint: None,
            timeout_secs: default_sink_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stderr only when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
