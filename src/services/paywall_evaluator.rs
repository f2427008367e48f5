//! Paywall trigger evaluation.
//!
//! Composes trial status, engagement, experiment assignment and offer
//! selection into one show/no-show decision per action event. The evaluator
//! works on an in-memory `UserRecord`; persisting the mutated record is the
//! caller's job, which keeps every decision all-or-nothing.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::models::{
    ActionType, DecisionReason, DecisionRecord, EngagementLevel, EngineSettings, TrialStatus,
    UserActionEvent, UserRecord,
};
use crate::services::experiment_assigner::{ExperimentAssigner, ExperimentSpec};
use crate::services::offer_selector::{OfferPolicy, OfferSelector};
use crate::services::trial_tracker::TrialStateTracker;

/// Intent thresholds and repeat limits for showing the paywall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub export_threshold: u32,
    pub save_threshold: u32,
    pub repeat_cooldown: Duration,
    pub experiment: ExperimentSpec,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            export_threshold: 2,
            save_threshold: 3,
            repeat_cooldown: Duration::hours(24),
            experiment: ExperimentSpec::new("paywall_v1", 2),
        }
    }
}

impl From<&EngineSettings> for TriggerPolicy {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            export_threshold: settings.export_intent_threshold,
            save_threshold: settings.save_intent_threshold,
            repeat_cooldown: Duration::hours(i64::from(settings.paywall_repeat_cooldown_hours)),
            experiment: ExperimentSpec::new(
                settings.paywall_experiment_id.clone(),
                settings.experiment_variant_count,
            ),
        }
    }
}

/// Outcome of evaluating one event against a user record.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: DecisionRecord,
    /// Session the user just left, whose counters can be discarded
    pub previous_session: Option<String>,
    /// Whether the record was mutated and must be persisted
    pub commit: bool,
}

/// Decides whether an action event shows the paywall.
#[derive(Debug, Clone)]
pub struct PaywallTriggerEvaluator {
    policy: TriggerPolicy,
    trials: TrialStateTracker,
    assigner: ExperimentAssigner,
    offers: OfferSelector,
}

impl PaywallTriggerEvaluator {
    pub const fn new(
        policy: TriggerPolicy,
        trials: TrialStateTracker,
        assigner: ExperimentAssigner,
        offers: OfferSelector,
    ) -> Self {
        Self {
            policy,
            trials,
            assigner,
            offers,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(
            TriggerPolicy::from(settings),
            TrialStateTracker::new(settings.trial_duration_days),
            ExperimentAssigner::new(),
            OfferSelector::new(OfferPolicy::from(settings)),
        )
    }

    pub const fn policy(&self) -> &TriggerPolicy {
        &self.policy
    }

    pub const fn trials(&self) -> &TrialStateTracker {
        &self.trials
    }

    pub const fn offers(&self) -> &OfferSelector {
        &self.offers
    }

    pub const fn assigner(&self) -> &ExperimentAssigner {
        &self.assigner
    }

    /// Evaluate `event` against `record`, mutating the record in place.
    ///
    /// Never fails: unknown action types resolve to a no-show that leaves the
    /// record untouched.
    pub fn evaluate(
        &self,
        record: &mut UserRecord,
        event: &UserActionEvent,
        engagement: EngagementLevel,
    ) -> Evaluation {
        let now = event.timestamp;

        if let ActionType::Unrecognized(raw) = &event.action_type {
            warn!(
                user_id = %event.user_id,
                action_type = %raw,
                "unrecognized action type, resolving to no-show"
            );
            let mut decision = DecisionRecord::no_show(event, DecisionReason::UnrecognizedAction);
            decision.engagement_level = engagement;
            decision.trial_status = self.trials.status(&record.trial, now);
            return Evaluation {
                decision,
                previous_session: None,
                commit: false,
            };
        }

        let is_new_user = record.is_new();
        let previous_session = self.observe(record, event);
        let trial_status = self.trials.status(&record.trial, now);

        let reason = if is_new_user {
            DecisionReason::NewUser
        } else {
            self.gate(record, &event.action_type, engagement, trial_status, now)
        };

        let mut decision = DecisionRecord {
            event_id: Uuid::new_v4(),
            user_id: event.user_id.clone(),
            session_id: event.session_id.clone(),
            action_type: event.action_type.clone(),
            show: false,
            variant: None,
            offer: None,
            reason,
            engagement_level: engagement,
            trial_status,
            timestamp: now,
        };

        if reason == DecisionReason::Shown {
            record.last_paywall_shown_at = Some(now);
            decision.show = true;
            decision.variant = Some(
                self.assigner
                    .assign(&record.user_id, &self.policy.experiment)
                    .label(),
            );
            decision.offer = self.offers.select(record, trial_status, now).into_offer();
        }

        debug!(
            user_id = %decision.user_id,
            action_type = %decision.action_type,
            engagement = %engagement,
            trial_status = %trial_status,
            show = decision.show,
            reason = %decision.reason,
            "paywall evaluated"
        );

        Evaluation {
            decision,
            previous_session,
            commit: true,
        }
    }

    /// Fold the event into the user's persisted counters.
    fn observe(&self, record: &mut UserRecord, event: &UserActionEvent) -> Option<String> {
        let previous = record.observe_session(&event.session_id);
        match event.action_type {
            ActionType::Export => record.export_count = record.export_count.saturating_add(1),
            ActionType::Save => record.save_count = record.save_count.saturating_add(1),
            _ => {}
        }
        record.updated_at = event.timestamp;
        previous
    }

    fn gate(
        &self,
        record: &UserRecord,
        action: &ActionType,
        engagement: EngagementLevel,
        trial_status: TrialStatus,
        now: DateTime<Utc>,
    ) -> DecisionReason {
        if trial_status == TrialStatus::Converted {
            return DecisionReason::Converted;
        }

        let intent_met = match action {
            ActionType::Export => record.export_count >= self.policy.export_threshold,
            ActionType::AdvancedFeature => engagement >= EngagementLevel::Medium,
            ActionType::Save => record.save_count >= self.policy.save_threshold,
            ActionType::Share => true,
            ActionType::Other => return DecisionReason::NoTriggerForAction,
            ActionType::Unrecognized(_) => return DecisionReason::UnrecognizedAction,
        };
        if !intent_met {
            return DecisionReason::BelowIntentThreshold;
        }

        if let Some(last) = record.last_paywall_shown_at {
            if now < last + self.policy.repeat_cooldown {
                return DecisionReason::RateLimited;
            }
        }

        DecisionReason::Shown
    }
}

impl Default for PaywallTriggerEvaluator {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap()
    }

    /// A user the engine has already persisted once.
    fn known_user() -> UserRecord {
        let mut record = UserRecord::new("u1", t0());
        record.version = 1;
        record.session_count = 3;
        record.last_session_id = Some("s1".into());
        record
    }

    fn event(action: &str, at: DateTime<Utc>) -> UserActionEvent {
        UserActionEvent::new("u1", "s1", action, at)
    }

    #[test]
    fn test_new_user_never_sees_paywall() {
        let evaluator = PaywallTriggerEvaluator::default();
        let mut record = UserRecord::new("u1", t0());

        let eval = evaluator.evaluate(&mut record, &event("share", t0()), EngagementLevel::High);
        assert!(!eval.decision.show);
        assert_eq!(eval.decision.reason, DecisionReason::NewUser);
        assert!(eval.commit);
        assert_eq!(record.session_count, 1);
    }

    #[test]
    fn test_export_threshold_counts_current_export() {
        let evaluator = PaywallTriggerEvaluator::default();
        let mut record = known_user();

        let first = evaluator.evaluate(&mut record, &event("export", t0()), EngagementLevel::Low);
        assert_eq!(first.decision.reason, DecisionReason::BelowIntentThreshold);

        let second = evaluator.evaluate(
            &mut record,
            &event("export", t0() + Duration::minutes(5)),
            EngagementLevel::High,
        );
        assert!(second.decision.show);
        assert_eq!(record.export_count, 2);
        assert!(second.decision.variant.as_deref().unwrap().starts_with("paywall_v1:"));
        assert!(second.decision.offer.is_some());
    }

    #[test]
    fn test_advanced_feature_requires_medium_engagement() {
        let evaluator = PaywallTriggerEvaluator::default();

        let mut record = known_user();
        let low = evaluator.evaluate(
            &mut record,
            &event("advancedFeature", t0()),
            EngagementLevel::Low,
        );
        assert_eq!(low.decision.reason, DecisionReason::BelowIntentThreshold);

        let medium = evaluator.evaluate(
            &mut record,
            &event("advancedFeature", t0()),
            EngagementLevel::Medium,
        );
        assert!(medium.decision.show);
    }

    #[test]
    fn test_save_requires_three_items() {
        let evaluator = PaywallTriggerEvaluator::default();
        let mut record = known_user();

        for minute in 0..2 {
            let eval = evaluator.evaluate(
                &mut record,
                &event("save", t0() + Duration::minutes(minute)),
                EngagementLevel::Low,
            );
            assert!(!eval.decision.show);
        }
        let third = evaluator.evaluate(
            &mut record,
            &event("save", t0() + Duration::minutes(3)),
            EngagementLevel::Low,
        );
        assert!(third.decision.show);
    }

    #[test]
    fn test_repeat_cooldown_applies_across_actions() {
        let evaluator = PaywallTriggerEvaluator::default();
        let mut record = known_user();

        let shown = evaluator.evaluate(&mut record, &event("share", t0()), EngagementLevel::Low);
        assert!(shown.decision.show);

        let soon = evaluator.evaluate(
            &mut record,
            &event("advancedFeature", t0() + Duration::hours(23)),
            EngagementLevel::High,
        );
        assert_eq!(soon.decision.reason, DecisionReason::RateLimited);

        let later = evaluator.evaluate(
            &mut record,
            &event("share", t0() + Duration::hours(24)),
            EngagementLevel::Low,
        );
        assert!(later.decision.show);
    }

    #[test]
    fn test_converted_user_never_sees_paywall() {
        let evaluator = PaywallTriggerEvaluator::default();
        let mut record = known_user();
        record.export_count = 5;
        evaluator.trials().mark_converted(&mut record.trial, t0());

        let eval = evaluator.evaluate(&mut record, &event("export", t0()), EngagementLevel::High);
        assert!(!eval.decision.show);
        assert_eq!(eval.decision.reason, DecisionReason::Converted);
        assert_eq!(eval.decision.trial_status, TrialStatus::Converted);
        assert!(eval.decision.offer.is_none());
    }

    #[test]
    fn test_other_and_unrecognized_actions() {
        let evaluator = PaywallTriggerEvaluator::default();
        let mut record = known_user();

        let other = evaluator.evaluate(&mut record, &event("other", t0()), EngagementLevel::High);
        assert_eq!(other.decision.reason, DecisionReason::NoTriggerForAction);
        assert!(other.commit);

        let before = record.clone();
        let unknown =
            evaluator.evaluate(&mut record, &event("teleport", t0()), EngagementLevel::High);
        assert!(!unknown.decision.show);
        assert_eq!(unknown.decision.reason, DecisionReason::UnrecognizedAction);
        assert!(!unknown.commit);
        assert_eq!(record, before);
    }

    #[test]
    fn test_new_session_reports_previous() {
        let evaluator = PaywallTriggerEvaluator::default();
        let mut record = known_user();

        let eval = evaluator.evaluate(
            &mut record,
            &UserActionEvent::new("u1", "s2", "other", t0()),
            EngagementLevel::Low,
        );
        assert_eq!(eval.previous_session.as_deref(), Some("s1"));
        assert_eq!(record.session_count, 4);
    }
}
