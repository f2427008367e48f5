//! In-memory analytics sink.
//!
//! Stores each distinct event once and can be scripted to fail, which makes it
//! the sink of choice for tests and for dry runs of the CLI.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::domain::models::{ConversionEvent, DecisionRecord, OutcomeRecord};
use crate::domain::ports::{AnalyticsSink, SinkError};

#[derive(Debug, Default)]
struct Stored {
    events: Vec<ConversionEvent>,
    seen: HashSet<String>,
}

/// Deduplicating sink that keeps events in process memory.
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsSink {
    stored: RwLock<Stored>,
    failures: Mutex<VecDeque<SinkError>>,
    attempts: AtomicU64,
}

impl InMemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next deliveries with `errors`, in order.
    pub async fn fail_next(&self, errors: Vec<SinkError>) {
        self.failures.lock().await.extend(errors);
    }

    /// Every stored event, in delivery order.
    pub async fn events(&self) -> Vec<ConversionEvent> {
        self.stored.read().await.events.clone()
    }

    pub async fn decisions(&self) -> Vec<DecisionRecord> {
        self.stored
            .read()
            .await
            .events
            .iter()
            .filter_map(|event| match event {
                ConversionEvent::Decision(record) => Some(record.clone()),
                ConversionEvent::Outcome(_) => None,
            })
            .collect()
    }

    pub async fn outcomes(&self) -> Vec<OutcomeRecord> {
        self.stored
            .read()
            .await
            .events
            .iter()
            .filter_map(|event| match event {
                ConversionEvent::Outcome(outcome) => Some(outcome.clone()),
                ConversionEvent::Decision(_) => None,
            })
            .collect()
    }

    /// Number of distinct stored events.
    pub async fn len(&self) -> usize {
        self.stored.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stored.read().await.events.is_empty()
    }

    /// Delivery attempts seen, including failed and duplicate ones.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalyticsSink {
    async fn deliver(&self, event: &ConversionEvent) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.failures.lock().await.pop_front() {
            return Err(err);
        }

        let mut stored = self.stored.write().await;
        if stored.seen.insert(event.dedup_key()) {
            stored.events.push(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DecisionOutcome, DecisionReason, UserActionEvent};
    use chrono::Utc;

    fn decision() -> DecisionRecord {
        let event = UserActionEvent::new("u1", "s1", "share", Utc::now());
        DecisionRecord::no_show(&event, DecisionReason::NewUser)
    }

    #[tokio::test]
    async fn test_same_event_stored_once() {
        let sink = InMemoryAnalyticsSink::new();
        let event = ConversionEvent::Decision(decision());

        sink.deliver(&event).await.unwrap();
        sink.deliver(&event).await.unwrap();

        assert_eq!(sink.len().await, 1);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn test_outcome_is_not_a_duplicate_of_its_decision() {
        let sink = InMemoryAnalyticsSink::new();
        let record = decision();
        sink.deliver(&ConversionEvent::Decision(record.clone()))
            .await
            .unwrap();
        sink.deliver(&ConversionEvent::Outcome(OutcomeRecord {
            event_id: record.event_id,
            outcome: DecisionOutcome::Purchased,
            recorded_at: Utc::now(),
        }))
        .await
        .unwrap();

        assert_eq!(sink.decisions().await.len(), 1);
        assert_eq!(sink.outcomes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let sink = InMemoryAnalyticsSink::new();
        sink.fail_next(vec![SinkError::Rejected("bad".into())]).await;
        let event = ConversionEvent::Decision(decision());

        assert!(sink.deliver(&event).await.is_err());
        assert!(sink.is_empty().await);
        assert!(sink.deliver(&event).await.is_ok());
        assert_eq!(sink.len().await, 1);
    }
}
