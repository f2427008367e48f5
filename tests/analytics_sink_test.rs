//! Integration tests for conversion event delivery
//!
//! Test coverage:
//! - HTTP sink request shape and idempotency header (mock server)
//! - Retry of transient collector errors, no retry of rejections
//! - Idempotent redelivery into the SQLite event log

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use common::{at, event, fast_emitter, sqlite_engine, warm_up};
use mockito::{Matcher, Server};
use paygate::adapters::http::{HttpAnalyticsSink, IDEMPOTENCY_HEADER};
use paygate::adapters::sqlite::{create_migrated_test_pool, SqliteAnalyticsSink};
use paygate::{
    AnalyticsSink, ConversionEvent, DecisionOutcome, DecisionReason, DecisionRecord,
    EngineSettings, SinkError,
};

fn sample_record() -> DecisionRecord {
    DecisionRecord::no_show(
        &event("u1", "s1", "export", at(Duration::zero())),
        DecisionReason::BelowIntentThreshold,
    )
}

fn http_sink(server: &Server) -> HttpAnalyticsSink {
    HttpAnalyticsSink::new(format!("{}/events", server.url()), StdDuration::from_secs(2))
        .expect("Failed to create sink")
}

#[tokio::test]
async fn test_http_sink_posts_event_with_idempotency_key() {
    let mut server = Server::new_async().await;
    let record = sample_record();
    let key = format!("decision:{}", record.event_id);

    let mock = server
        .mock("POST", "/events")
        .match_header(IDEMPOTENCY_HEADER, key.as_str())
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "type": "decision",
            "userId": "u1",
            "show": false,
            "reason": "below_intent_threshold",
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    http_sink(&server)
        .deliver(&ConversionEvent::Decision(record))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_sink_treats_conflict_as_already_stored() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .with_status(409)
        .create_async()
        .await;

    let result = http_sink(&server)
        .deliver(&ConversionEvent::Decision(sample_record()))
        .await;
    assert!(result.is_ok());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_sink_classifies_errors() {
    let mut server = Server::new_async().await;
    let _unavailable = server
        .mock("POST", "/events")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let err = http_sink(&server)
        .deliver(&ConversionEvent::Decision(sample_record()))
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Unavailable(ref msg) if msg.contains("maintenance")));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_emitter_retries_unavailable_collector() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let emitter = fast_emitter(Arc::new(http_sink(&server)));
    assert!(emitter.emit(sample_record()));
    let stats = emitter.shutdown().await;

    mock.assert_async().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.delivered, 0);
}

#[tokio::test]
async fn test_emitter_does_not_retry_rejected_event() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .with_status(400)
        .with_body("bad payload")
        .expect(1)
        .create_async()
        .await;

    let emitter = fast_emitter(Arc::new(http_sink(&server)));
    emitter.emit(sample_record());
    let stats = emitter.shutdown().await;

    mock.assert_async().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 0);
}

#[tokio::test]
async fn test_sqlite_sink_redelivery_is_idempotent() {
    let pool = create_migrated_test_pool().await.unwrap();
    let sink = Arc::new(SqliteAnalyticsSink::new(pool));
    let record = sample_record();

    let emitter = fast_emitter(sink.clone());
    for _ in 0..3 {
        emitter.emit(record.clone());
    }
    emitter.emit_outcome(record.event_id, DecisionOutcome::Purchased, at(Duration::hours(1)));
    emitter.emit_outcome(record.event_id, DecisionOutcome::Dismissed, at(Duration::hours(2)));
    let stats = emitter.shutdown().await;

    assert_eq!(stats.delivered, 5);
    assert_eq!(sink.decision_count().await.unwrap(), 1);
    assert_eq!(
        sink.outcome_for(record.event_id).await.unwrap(),
        Some(DecisionOutcome::Purchased)
    );
}

#[tokio::test]
async fn test_engine_decisions_land_in_sqlite_log() {
    let fixture = sqlite_engine(EngineSettings::default()).await;
    warm_up(&fixture.engine, "gina", 3).await;
    let shown = fixture
        .engine
        .evaluate_record(event("gina", "s5", "share", at(Duration::days(1))))
        .await;
    assert!(shown.show);
    assert!(fixture
        .engine
        .record_outcome(shown.event_id, DecisionOutcome::OfferAccepted, at(Duration::days(1))));

    fixture.engine.shutdown().await;

    assert_eq!(fixture.sink.decision_count().await.unwrap(), 4);
    let (stored_show, variant): (bool, Option<String>) =
        sqlx::query_as("SELECT shown, variant FROM decision_events WHERE event_id = ?")
            .bind(shown.event_id.to_string())
            .fetch_one(&fixture.pool)
            .await
            .unwrap();
    assert!(stored_show);
    assert_eq!(variant, shown.variant);
    assert_eq!(
        fixture.sink.outcome_for(shown.event_id).await.unwrap(),
        Some(DecisionOutcome::OfferAccepted)
    );
}
