//! Asynchronous, at-least-once delivery of conversion events.
//!
//! `emit` only ever performs a non-blocking enqueue onto a bounded channel.
//! A single worker task drains the channel in order and delivers each event to
//! the analytics sink with exponential backoff. Events that exhaust their
//! attempts, or that arrive while the queue is full, are dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::models::{
    ConversionEvent, DecisionOutcome, DecisionRecord, EmitterConfig, OutcomeRecord,
};
use crate::domain::ports::AnalyticsSink;
use crate::services::retry::RetryPolicy;

/// Delivery counters shared between the emitter and its worker.
#[derive(Debug, Default)]
struct EmitterCounters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    /// Enqueued but not yet finished
    pending: AtomicU64,
}

/// Point-in-time copy of the emitter's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitterStats {
    pub enqueued: u64,
    pub delivered: u64,
    /// Extra attempts spent on transient failures
    pub retried: u64,
    /// Events given up on after delivery attempts
    pub failed: u64,
    /// Events rejected at enqueue time
    pub dropped: u64,
    pub pending: u64,
}

struct Shared {
    counters: EmitterCounters,
    idle: Notify,
}

impl Shared {
    fn finish_one(&self) {
        if self.counters.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Records decisions and outcomes to an external sink off the decision path.
pub struct ConversionEventEmitter {
    sender: mpsc::Sender<ConversionEvent>,
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl ConversionEventEmitter {
    /// Start the delivery worker. Must be called inside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn AnalyticsSink>, config: &EmitterConfig) -> Self {
        Self::with_policy(sink, RetryPolicy::from(config), config.queue_capacity)
    }

    pub fn with_policy(
        sink: Arc<dyn AnalyticsSink>,
        policy: RetryPolicy,
        queue_capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let shared = Arc::new(Shared {
            counters: EmitterCounters::default(),
            idle: Notify::new(),
        });
        let worker = tokio::spawn(run_worker(receiver, sink, policy, Arc::clone(&shared)));

        Self {
            sender,
            shared,
            worker,
        }
    }

    /// Queue a decision record for delivery. Never waits.
    ///
    /// Returns `false` if the event was dropped because the queue was full.
    pub fn emit(&self, record: DecisionRecord) -> bool {
        self.enqueue(ConversionEvent::Decision(record))
    }

    /// Queue the outcome of an earlier decision.
    pub fn emit_outcome(
        &self,
        event_id: Uuid,
        outcome: DecisionOutcome,
        recorded_at: DateTime<Utc>,
    ) -> bool {
        self.enqueue(ConversionEvent::Outcome(OutcomeRecord {
            event_id,
            outcome,
            recorded_at,
        }))
    }

    fn enqueue(&self, event: ConversionEvent) -> bool {
        let counters = &self.shared.counters;
        counters.pending.fetch_add(1, Ordering::AcqRel);

        match self.sender.try_send(event) {
            Ok(()) => {
                counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.shared.finish_one();
                warn!(
                    event_id = %event.event_id(),
                    kind = event.kind(),
                    "emitter queue full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.shared.finish_one();
                error!(
                    event_id = %event.event_id(),
                    kind = event.kind(),
                    "emitter worker stopped, dropping event"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> EmitterStats {
        Self::snapshot(&self.shared)
    }

    /// Wait until every queued event has been delivered or given up on.
    pub async fn flush(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.counters.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting events, drain the queue and return the final counters.
    pub async fn shutdown(self) -> EmitterStats {
        let Self {
            sender,
            shared,
            worker,
        } = self;
        drop(sender);
        if let Err(err) = worker.await {
            error!(error = %err, "emitter worker terminated abnormally");
        }

        let stats = Self::snapshot(&shared);
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "conversion emitter stopped"
        );
        stats
    }

    fn snapshot(shared: &Shared) -> EmitterStats {
        let counters = &shared.counters;
        EmitterStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            pending: counters.pending.load(Ordering::Acquire),
        }
    }
}

impl std::fmt::Debug for ConversionEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionEventEmitter")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<ConversionEvent>,
    sink: Arc<dyn AnalyticsSink>,
    policy: RetryPolicy,
    shared: Arc<Shared>,
) {
    debug!("conversion emitter started");
    while let Some(event) = receiver.recv().await {
        let outcome = policy.execute(|| sink.deliver(&event)).await;
        let counters = &shared.counters;
        counters
            .retried
            .fetch_add(u64::from(outcome.attempts.saturating_sub(1)), Ordering::Relaxed);

        match outcome.result {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event_id = %event.event_id(),
                    kind = event.kind(),
                    attempts = outcome.attempts,
                    "conversion event delivered"
                );
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_id = %event.event_id(),
                    kind = event.kind(),
                    attempts = outcome.attempts,
                    error = %err,
                    "dropping conversion event after failed delivery"
                );
            }
        }
        shared.finish_one();
    }
}
