pub mod config;
pub mod decision;
pub mod engagement;
pub mod offer;
pub mod trial;
pub mod user_state;

pub use config::{
    Config, DatabaseConfig, EmitterConfig, EngineSettings, LoggingConfig, SinkConfig, SinkKind,
};
pub use decision::{
    ActionType, ConversionEvent, DecisionOutcome, DecisionReason, DecisionRecord, OutcomeRecord,
    PaywallDecision, UserActionEvent,
};
pub use engagement::{EngagementLevel, UserSession};
pub use offer::Offer;
pub use trial::{check_trial_duration, TrialState, TrialStatus, MAX_TRIAL_DURATION_DAYS};
pub use user_state::UserRecord;
