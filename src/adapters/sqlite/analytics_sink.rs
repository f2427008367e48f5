//! SQLite-backed analytics sink.
//!
//! Decision and outcome rows are keyed by event id and written with
//! `INSERT OR IGNORE`, so redelivery of an event is a no-op.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::models::{ConversionEvent, DecisionOutcome, DecisionRecord, OutcomeRecord};
use crate::domain::ports::{AnalyticsSink, SinkError};

#[derive(Clone)]
pub struct SqliteAnalyticsSink {
    pool: SqlitePool,
}

impl SqliteAnalyticsSink {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_decision(&self, record: &DecisionRecord) -> Result<(), sqlx::Error> {
        let offer_json = record
            .offer
            .as_ref()
            .and_then(|offer| serde_json::to_string(offer).ok());

        sqlx::query(
            r"INSERT OR IGNORE INTO decision_events (event_id, user_id, session_id, action_type,
                shown, variant, offer, reason, engagement_level, trial_status, timestamp)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.event_id.to_string())
        .bind(&record.user_id)
        .bind(&record.session_id)
        .bind(record.action_type.as_str())
        .bind(record.show)
        .bind(&record.variant)
        .bind(offer_json)
        .bind(record.reason.as_str())
        .bind(record.engagement_level.as_str())
        .bind(record.trial_status.as_str())
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO decision_outcomes (event_id, outcome, recorded_at) VALUES (?, ?, ?)",
        )
        .bind(outcome.event_id.to_string())
        .bind(outcome.outcome.as_str())
        .bind(outcome.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of stored decision events.
    pub async fn decision_count(&self) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM decision_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Stored outcome of a decision, if any was reported.
    pub async fn outcome_for(&self, event_id: Uuid) -> Result<Option<DecisionOutcome>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT outcome FROM decision_outcomes WHERE event_id = ?")
                .bind(event_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(outcome,)| outcome.parse().ok()))
    }
}

#[async_trait]
impl AnalyticsSink for SqliteAnalyticsSink {
    async fn deliver(&self, event: &ConversionEvent) -> Result<(), SinkError> {
        let result = match event {
            ConversionEvent::Decision(record) => self.insert_decision(record).await,
            ConversionEvent::Outcome(outcome) => self.insert_outcome(outcome).await,
        };
        result.map_err(|e| SinkError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{DecisionReason, UserActionEvent};
    use chrono::Utc;

    async fn setup() -> SqliteAnalyticsSink {
        SqliteAnalyticsSink::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let sink = setup().await;
        let event = UserActionEvent::new("u1", "s1", "export", Utc::now());
        let record = ConversionEvent::Decision(DecisionRecord::no_show(
            &event,
            DecisionReason::BelowIntentThreshold,
        ));

        sink.deliver(&record).await.unwrap();
        sink.deliver(&record).await.unwrap();
        assert_eq!(sink.decision_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let sink = setup().await;
        let event_id = Uuid::new_v4();
        for outcome in [DecisionOutcome::OfferAccepted, DecisionOutcome::Dismissed] {
            sink.deliver(&ConversionEvent::Outcome(OutcomeRecord {
                event_id,
                outcome,
                recorded_at: Utc::now(),
            }))
            .await
            .unwrap();
        }

        assert_eq!(
            sink.outcome_for(event_id).await.unwrap(),
            Some(DecisionOutcome::OfferAccepted)
        );
        assert_eq!(sink.outcome_for(Uuid::new_v4()).await.unwrap(), None);
    }
}
