//! Service layer: the decision components and the engine that composes them.

pub mod conversion_emitter;
pub mod decision_engine;
pub mod engagement_scorer;
pub mod experiment_assigner;
pub mod offer_selector;
pub mod paywall_evaluator;
pub mod retry;
pub mod trial_tracker;
pub mod user_locks;

pub use conversion_emitter::{ConversionEventEmitter, EmitterStats};
pub use decision_engine::DecisionEngine;
pub use engagement_scorer::{EngagementScorer, EngagementThresholds};
pub use experiment_assigner::{ExperimentAssigner, ExperimentAssignment, ExperimentSpec};
pub use offer_selector::{OfferIneligibility, OfferPolicy, OfferSelection, OfferSelector};
pub use paywall_evaluator::{Evaluation, PaywallTriggerEvaluator, TriggerPolicy};
pub use retry::{RetryOutcome, RetryPolicy};
pub use trial_tracker::TrialStateTracker;
pub use user_locks::{UserGuard, UserLocks};
