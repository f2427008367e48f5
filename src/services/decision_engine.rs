//! The decision engine facade.
//!
//! Owns all per-user state. Every operation on a user runs under that user's
//! lock and ends in at most one conditional write, so a decision is either
//! committed entirely or not at all. Nothing in here waits on the analytics
//! sink: decision records are handed to the emitter after the lock is released.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    check_trial_duration, DecisionOutcome, DecisionReason, DecisionRecord, EngineSettings, PaywallDecision, TrialState,
    TrialStatus, UserActionEvent, UserRecord, UserSession,
};
use crate::domain::ports::UserStateRepository;
use crate::services::conversion_emitter::{ConversionEventEmitter, EmitterStats};
use crate::services::engagement_scorer::EngagementScorer;
use crate::services::experiment_assigner::ExperimentAssignment;
use crate::services::offer_selector::OfferSelection;
use crate::services::paywall_evaluator::PaywallTriggerEvaluator;
use crate::services::user_locks::{UserGuard, UserLocks};

/// Evaluates user actions into paywall decisions and manages per-user state.
pub struct DecisionEngine {
    settings: EngineSettings,
    repository: Arc<dyn UserStateRepository>,
    scorer: EngagementScorer,
    evaluator: PaywallTriggerEvaluator,
    locks: UserLocks,
    emitter: ConversionEventEmitter,
}

impl DecisionEngine {
    pub fn new(
        settings: EngineSettings,
        repository: Arc<dyn UserStateRepository>,
        emitter: ConversionEventEmitter,
    ) -> Self {
        Self {
            scorer: EngagementScorer::from_settings(&settings),
            evaluator: PaywallTriggerEvaluator::from_settings(&settings),
            locks: UserLocks::new(),
            settings,
            repository,
            emitter,
        }
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub const fn scorer(&self) -> &EngagementScorer {
        &self.scorer
    }

    const fn budget(&self) -> StdDuration {
        StdDuration::from_millis(self.settings.decision_budget_ms)
    }

    /// Decide whether `event` shows the paywall. Never fails.
    pub async fn evaluate(&self, event: UserActionEvent) -> PaywallDecision {
        PaywallDecision::from(&self.evaluate_record(event).await)
    }

    /// Like `evaluate`, returning the full audit record.
    ///
    /// The record is also handed to the emitter once the user's lock is
    /// released. Storage failures, conflicts that outlast the retry limit and
    /// a blown decision budget all yield a no-show record whose reason says why.
    ///
    /// # Arguments
    /// * `event` - The user action to decide on; its timestamp is the decision clock
    ///
    /// # Example
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use paygate::adapters::memory::{InMemoryAnalyticsSink, InMemoryUserStateRepository};
    /// # use paygate::domain::models::{EmitterConfig, EngineSettings, UserActionEvent};
    /// # use paygate::services::{ConversionEventEmitter, DecisionEngine};
    /// # async fn example() {
    /// let emitter = ConversionEventEmitter::spawn(
    ///     Arc::new(InMemoryAnalyticsSink::new()),
    ///     &EmitterConfig::default(),
    /// );
    /// let engine = DecisionEngine::new(
    ///     EngineSettings::default(),
    ///     Arc::new(InMemoryUserStateRepository::new()),
    ///     emitter,
    /// );
    ///
    /// let event = UserActionEvent::new("u1", "s1", "export", chrono::Utc::now());
    /// let record = engine.evaluate_record(event).await;
    /// println!("show={} reason={:?}", record.show, record.reason);
    /// # }
    /// ```
    #[instrument(skip(self, event), fields(user_id = %event.user_id, action_type = %event.action_type))]
    pub async fn evaluate_record(&self, event: UserActionEvent) -> DecisionRecord {
        let record = self.decide(&event).await;
        // The user lock is released by now; emission never holds it.
        self.emitter.emit(record.clone());
        record
    }

    /// Runs the whole read-decide-write cycle against one deadline taken at
    /// entry. Lock wait, loads, conflict retries and saves all share it.
    async fn decide(&self, event: &UserActionEvent) -> DecisionRecord {
        let deadline = Instant::now() + self.budget();
        if let Ok(record) = timeout_at(deadline, self.decide_locked(event)).await {
            return record;
        }
        warn!(
            budget_ms = self.settings.decision_budget_ms,
            "decision budget exceeded, failing open"
        );
        DecisionRecord::no_show(event, DecisionReason::StateUnavailable)
    }

    async fn decide_locked(&self, event: &UserActionEvent) -> DecisionRecord {
        let _guard = self.locks.acquire(&event.user_id).await;

        let mut conflicts = 0;
        loop {
            let loaded = match self.repository.load(&event.user_id).await {
                Ok(loaded) => loaded,
                Err(err) if err.is_corruption() => {
                    warn!(error = %err, "user state unreadable, failing open");
                    return DecisionRecord::no_show(event, DecisionReason::StateCorrupted);
                }
                Err(err) => {
                    warn!(error = %err, "user state unavailable, failing open");
                    return DecisionRecord::no_show(event, DecisionReason::StateUnavailable);
                }
            };
            let mut record =
                loaded.unwrap_or_else(|| UserRecord::new(&event.user_id, event.timestamp));

            if !event.action_type.is_recognized() {
                let engagement = self.scorer.level(&event.session_id);
                return self.evaluator.evaluate(&mut record, event, engagement).decision;
            }

            let session = self
                .scorer
                .preview(&event.user_id, &event.session_id, event.timestamp);
            let engagement = self.scorer.classify(&session);
            let evaluation = self.evaluator.evaluate(&mut record, event, engagement);

            match self.repository.save(&record).await {
                Ok(version) => {
                    // No await between the write and here: a committed write
                    // always commits the session too.
                    self.scorer.commit(session);
                    if let Some(previous) = evaluation.previous_session {
                        self.scorer.end(&previous);
                    }
                    debug!(version, show = evaluation.decision.show, "decision committed");
                    return evaluation.decision;
                }
                Err(err) if err.is_conflict() && conflicts < self.settings.max_conflict_retries => {
                    conflicts += 1;
                    debug!(conflicts, "user state changed concurrently, retrying");
                }
                Err(err) if err.is_conflict() => {
                    warn!(conflicts, "conflict retries exhausted, failing open");
                    return DecisionRecord::no_show(event, DecisionReason::ConflictRetriesExhausted);
                }
                Err(err) => {
                    warn!(error = %err, "failed to persist user state, failing open");
                    return DecisionRecord::no_show(event, DecisionReason::StateUnavailable);
                }
            }
        }
    }

    /// Read-modify-write of one user's record under the user lock.
    ///
    /// The record is written only if `apply` changed it. Optimistic conflicts
    /// are retried up to the configured bound and then surfaced.
    async fn update<T>(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        apply: impl Fn(&mut UserRecord) -> T + Send,
    ) -> DomainResult<T> {
        let _guard: UserGuard = self.locks.acquire(user_id).await;

        let mut conflicts = 0;
        loop {
            let mut record = self
                .repository
                .load(user_id)
                .await?
                .unwrap_or_else(|| UserRecord::new(user_id, now));
            let before = record.clone();
            let result = apply(&mut record);
            if record == before {
                return Ok(result);
            }
            record.updated_at = now;

            match self.repository.save(&record).await {
                Ok(_) => return Ok(result),
                Err(err) if err.is_conflict() && conflicts < self.settings.max_conflict_retries => {
                    conflicts += 1;
                    debug!(user_id, conflicts, "user state changed concurrently, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn read(&self, user_id: &str) -> DomainResult<Option<UserRecord>> {
        self.repository.load(user_id).await
    }

    /// Start the user's trial with the configured duration. Idempotent.
    pub async fn start_trial(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<TrialState> {
        self.start_trial_with_duration(user_id, self.settings.trial_duration_days, now)
            .await
    }

    /// Start the user's trial once; later calls leave it untouched.
    pub async fn start_trial_with_duration(
        &self,
        user_id: &str,
        duration_days: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<TrialState> {
        let duration_days = check_trial_duration(duration_days)?;
        let trials = *self.evaluator.trials();
        let trial = self
            .update(user_id, now, |record| {
                trials
                    .start_with_duration(&mut record.trial, duration_days, now)
                    .map(|_| record.trial.clone())
            })
            .await??;
        info!(user_id, status = %trial.status, duration_days = trial.duration_days, "trial start requested");
        Ok(trial)
    }

    /// Trial status at `now`; `NotStarted` for an unknown user.
    pub async fn trial_status(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<TrialStatus> {
        let trial = self.read(user_id).await?.map(|r| r.trial).unwrap_or_default();
        Ok(self.evaluator.trials().status(&trial, now))
    }

    pub async fn days_remaining(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<u32> {
        let trial = self.read(user_id).await?.map(|r| r.trial).unwrap_or_default();
        Ok(self.evaluator.trials().days_remaining(&trial, now))
    }

    /// Record a verified purchase. Returns `false` if already converted.
    pub async fn mark_converted(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<bool> {
        let trials = *self.evaluator.trials();
        let converted = self
            .update(user_id, now, |record| trials.mark_converted(&mut record.trial, now))
            .await?;
        if converted {
            info!(user_id, "user converted");
        }
        Ok(converted)
    }

    /// Select an offer for the user outside of a paywall decision.
    pub async fn request_offer(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<OfferSelection> {
        let evaluator = &self.evaluator;
        self.update(user_id, now, |record| {
            let status = evaluator.trials().status(&record.trial, now);
            evaluator.offers().select(record, status, now)
        })
        .await
    }

    /// Report what the user did after decision `event_id`.
    pub fn record_outcome(
        &self,
        event_id: Uuid,
        outcome: DecisionOutcome,
        now: DateTime<Utc>,
    ) -> bool {
        self.emitter.emit_outcome(event_id, outcome, now)
    }

    /// Discard a session's engagement counters.
    pub fn end_session(&self, session_id: &str) -> Option<UserSession> {
        self.scorer.end(session_id)
    }

    /// The user's paywall experiment assignment.
    pub fn paywall_variant(&self, user_id: &str) -> ExperimentAssignment {
        self.evaluator
            .assigner()
            .assign(user_id, &self.evaluator.policy().experiment)
    }

    /// Variant for an arbitrary experiment with the configured variant count.
    pub fn variant(&self, user_id: &str, experiment_id: &str) -> u32 {
        self.variant_with_count(user_id, experiment_id, self.settings.experiment_variant_count)
    }

    pub fn variant_with_count(&self, user_id: &str, experiment_id: &str, variant_count: u32) -> u32 {
        self.evaluator
            .assigner()
            .variant(user_id, experiment_id, variant_count)
    }

    pub fn emitter_stats(&self) -> EmitterStats {
        self.emitter.stats()
    }

    /// Wait for queued conversion events to be delivered or dropped.
    pub async fn flush(&self) {
        self.emitter.flush().await;
    }

    /// Drain the emitter and stop it.
    pub async fn shutdown(self) -> EmitterStats {
        self.emitter.shutdown().await
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("settings", &self.settings)
            .field("active_sessions", &self.scorer.active_sessions())
            .field("emitter", &self.emitter)
            .finish_non_exhaustive()
    }
}
