//! End-to-end paywall decision scenarios against the in-memory adapters.

mod common;

use chrono::Duration;
use common::{at, event, memory_engine, warm_up};
use paygate::services::{OfferIneligibility, OfferSelection};
use paygate::{DecisionReason, EngagementLevel, EngineSettings, TrialStatus};

const USER: &str = "user-7";

/// Ten filler actions followed by two exports, spanning 310s in session `s3`.
/// Returns the instant of the final export.
async fn engaged_session_with_two_exports(
    engine: &paygate::DecisionEngine,
) -> (paygate::DecisionRecord, paygate::DecisionRecord) {
    let base = at(Duration::days(1));
    for n in 0..10 {
        engine
            .evaluate(event(USER, "s3", "other", base + Duration::seconds(n * 30)))
            .await;
    }
    let first = engine
        .evaluate_record(event(USER, "s3", "export", base + Duration::seconds(280)))
        .await;
    let second = engine
        .evaluate_record(event(USER, "s3", "export", base + Duration::seconds(310)))
        .await;
    (first, second)
}

#[tokio::test]
async fn test_new_user_first_export_is_not_shown() {
    let fixture = memory_engine(EngineSettings::default());

    let decision = fixture
        .engine
        .evaluate(event(USER, "s1", "export", at(Duration::seconds(10))))
        .await;

    assert!(!decision.show);
    assert!(decision.variant.is_none());
    assert!(decision.offer.is_none());
    assert_eq!(decision.context, "new_user");
}

#[tokio::test]
async fn test_known_user_first_export_is_below_threshold() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 1).await;

    let record = fixture
        .engine
        .evaluate_record(event(USER, "s2", "export", at(Duration::hours(5))))
        .await;

    assert!(!record.show);
    assert_eq!(record.reason, DecisionReason::BelowIntentThreshold);
    assert_eq!(record.engagement_level, EngagementLevel::Low);
}

#[tokio::test]
async fn test_second_export_with_high_engagement_shows_paywall_and_offer() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 2).await;

    let (first, second) = engaged_session_with_two_exports(&fixture.engine).await;

    assert!(!first.show);
    assert_eq!(first.reason, DecisionReason::BelowIntentThreshold);

    assert!(second.show);
    assert_eq!(second.reason, DecisionReason::Shown);
    assert_eq!(second.engagement_level, EngagementLevel::High);

    let expected_variant = fixture.engine.paywall_variant(USER).label();
    assert_eq!(second.variant.as_deref(), Some(expected_variant.as_str()));

    let offer = second.offer.expect("eligible user should get an offer");
    assert_eq!(offer.created_at, second.timestamp);
    assert_eq!(offer.expires_at - offer.created_at, Duration::hours(48));
    assert_eq!(offer.cooldown_until - offer.created_at, Duration::days(7));
    assert_eq!(offer.discount_percent, 30);

    let session = fixture.engine.scorer().session("s3").unwrap();
    assert_eq!(session.action_count, 12);
    assert_eq!(session.duration_secs(), 310);
}

#[tokio::test]
async fn test_offer_cooldown_after_shown_paywall() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 2).await;
    let (_, shown) = engaged_session_with_two_exports(&fixture.engine).await;
    let granted = shown.offer.unwrap();
    let t = shown.timestamp;

    let one_day = fixture
        .engine
        .request_offer(USER, t + Duration::days(1))
        .await
        .unwrap();
    assert!(!one_day.is_granted());
    assert_eq!(one_day, OfferSelection::Existing(granted.clone()));

    let two_days = fixture
        .engine
        .request_offer(USER, t + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(
        two_days,
        OfferSelection::Ineligible(OfferIneligibility::CoolingDown {
            until: granted.cooldown_until
        })
    );

    let eight_days = fixture
        .engine
        .request_offer(USER, t + Duration::days(8))
        .await
        .unwrap();
    assert!(eight_days.is_granted());
    let renewed = eight_days.into_offer().unwrap();
    assert_eq!(renewed.created_at, t + Duration::days(8));
    assert_ne!(renewed, granted);
}

#[tokio::test]
async fn test_offer_requires_three_sessions() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 2).await;

    let selection = fixture
        .engine
        .request_offer(USER, at(Duration::days(1)))
        .await
        .unwrap();
    assert_eq!(
        selection,
        OfferSelection::Ineligible(OfferIneligibility::InsufficientSessions {
            recorded: 2,
            required: 3
        })
    );
}

#[tokio::test]
async fn test_converted_user_is_never_shown() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 2).await;
    fixture.engine.start_trial(USER, at(Duration::hours(3))).await.unwrap();
    assert!(fixture
        .engine
        .mark_converted(USER, at(Duration::hours(4)))
        .await
        .unwrap());

    let (first, second) = engaged_session_with_two_exports(&fixture.engine).await;
    for record in [first, second] {
        assert!(!record.show);
        assert_eq!(record.reason, DecisionReason::Converted);
        assert_eq!(record.trial_status, TrialStatus::Converted);
        assert!(record.offer.is_none());
    }

    let selection = fixture
        .engine
        .request_offer(USER, at(Duration::days(2)))
        .await
        .unwrap();
    assert_eq!(selection, OfferSelection::Ineligible(OfferIneligibility::Converted));
}

#[tokio::test]
async fn test_repeat_paywall_is_rate_limited_across_action_types() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 2).await;
    let (_, shown) = engaged_session_with_two_exports(&fixture.engine).await;
    let t = shown.timestamp;

    let share_soon = fixture
        .engine
        .evaluate_record(event(USER, "s3", "share", t + Duration::hours(1)))
        .await;
    assert!(!share_soon.show);
    assert_eq!(share_soon.reason, DecisionReason::RateLimited);

    let share_later = fixture
        .engine
        .evaluate_record(event(USER, "s4", "share", t + Duration::hours(25)))
        .await;
    assert!(share_later.show);
    assert_eq!(
        share_later.offer.as_ref(),
        shown.offer.as_ref(),
        "the still-active offer is presented again"
    );
}

#[tokio::test]
async fn test_other_action_never_triggers() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 3).await;

    let record = fixture
        .engine
        .evaluate_record(event(USER, "s9", "other", at(Duration::days(1))))
        .await;
    assert!(!record.show);
    assert_eq!(record.reason, DecisionReason::NoTriggerForAction);
}

#[tokio::test]
async fn test_every_decision_is_audited_once() {
    let fixture = memory_engine(EngineSettings::default());
    warm_up(&fixture.engine, USER, 2).await;
    let (_, shown) = engaged_session_with_two_exports(&fixture.engine).await;

    let stats = fixture.engine.shutdown().await;
    let decisions = fixture.sink.decisions().await;

    // 2 warm-up events, 10 filler actions, 2 exports
    assert_eq!(decisions.len(), 14);
    assert_eq!(stats.delivered, 14);
    assert_eq!(stats.dropped, 0);
    assert_eq!(decisions.iter().filter(|d| d.show).count(), 1);
    assert!(decisions.iter().any(|d| d.event_id == shown.event_id && d.show));
}
