//! Paygate - subscription lifecycle and paywall decision engine
//!
//! Paygate decides, for each user action in a freemium product, whether to
//! show an upgrade paywall, which experiment variant to show and whether to
//! attach a time-limited retention offer. It tracks trials, scores
//! in-session engagement and emits an auditable record of every decision.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and ports
//! - **Service Layer** (`services`): Trial, engagement, experiment, offer and
//!   paywall logic, coordinated by [`DecisionEngine`]
//! - **Adapters** (`adapters`): In-memory, `SQLite` and HTTP implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging and setup
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paygate::adapters::memory::{InMemoryAnalyticsSink, InMemoryUserStateRepository};
//! use paygate::{ConversionEventEmitter, DecisionEngine, EngineSettings, UserActionEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let emitter = ConversionEventEmitter::spawn(
//!         Arc::new(InMemoryAnalyticsSink::new()),
//!         &Default::default(),
//!     );
//!     let engine = DecisionEngine::new(
//!         EngineSettings::default(),
//!         Arc::new(InMemoryUserStateRepository::new()),
//!         emitter,
//!     );
//!     let decision = engine
//!         .evaluate(UserActionEvent::new("u1", "s1", "export", chrono::Utc::now()))
//!         .await;
//!     println!("show paywall: {}", decision.show);
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    ActionType, Config, ConversionEvent, DecisionOutcome, DecisionReason, DecisionRecord,
    EngagementLevel, EngineSettings, Offer, PaywallDecision, TrialState, TrialStatus,
    UserActionEvent, UserRecord,
};
pub use domain::ports::{AnalyticsSink, SinkError, UserStateRepository};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ConversionEventEmitter, DecisionEngine, EmitterStats, EngagementScorer, ExperimentAssigner,
    OfferSelector, PaywallTriggerEvaluator, TrialStateTracker,
};
