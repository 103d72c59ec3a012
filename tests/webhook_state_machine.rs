use payments_reconciler::domain::webhook_event::{
    can_retry, health_label, is_settlement_topic, plan_manual_retry, retry_backoff, EventStatus,
    ManualRetryRejection, DEFAULT_MAX_ATTEMPTS,
};
use payments_reconciler::intake::signature::SignatureState;
use payments_reconciler::service::intake_service::build_event;
use payments_reconciler::service::settlement_guard::{failure_transition, route_event, EventRoute};
use serde_json::json;
use std::time::Duration;

/// Replays the worker's bookkeeping for an event that fails every attempt:
/// claim bumps attempts, the failure transition picks the next status.
fn run_until_stuck(max_attempts: i32) -> Vec<(i32, EventStatus)> {
    let mut attempts = 0;
    let mut status = EventStatus::Pending;
    let mut history = Vec::new();
    while status == EventStatus::Pending && attempts < max_attempts {
        attempts += 1;
        let transition = failure_transition(attempts, max_attempts);
        status = transition.status;
        history.push((attempts, status));
        if can_retry(status, attempts, max_attempts) {
            status = EventStatus::Pending;
        }
    }
    history
}

#[test]
fn failing_event_goes_error_then_failed_at_the_cap() {
    let history = run_until_stuck(DEFAULT_MAX_ATTEMPTS);
    assert_eq!(
        history,
        vec![
            (1, EventStatus::Error),
            (2, EventStatus::Error),
            (3, EventStatus::Failed),
        ]
    );
}

#[test]
fn attempts_never_exceed_the_cap() {
    for max in 1..=6 {
        let history = run_until_stuck(max);
        assert_eq!(history.len() as i32, max);
        assert!(history.iter().all(|(attempts, _)| *attempts <= max));
        assert_eq!(history.last().map(|(_, s)| *s), Some(EventStatus::Failed));
    }
}

#[test]
fn only_the_last_failure_is_exhausting() {
    assert!(!failure_transition(1, 3).exhausted);
    assert!(!failure_transition(2, 3).exhausted);
    assert!(failure_transition(3, 3).exhausted);
}

#[test]
fn manual_retry_keeps_attempts_unless_reset() {
    let plan = plan_manual_retry(EventStatus::Error, 1, 3, false).unwrap();
    assert!(!plan.reset_attempts);

    let capped = plan_manual_retry(EventStatus::Failed, 3, 3, false);
    assert_eq!(
        capped,
        Err(ManualRetryRejection::AttemptCapReached {
            attempts: 3,
            max_attempts: 3
        })
    );

    let reset = plan_manual_retry(EventStatus::Failed, 3, 3, true).unwrap();
    assert!(reset.reset_attempts);
}

#[test]
fn manual_retry_rejects_live_or_finished_events() {
    for status in [EventStatus::Pending, EventStatus::Processing, EventStatus::Processed] {
        assert_eq!(
            plan_manual_retry(status, 1, 3, true),
            Err(ManualRetryRejection::NotRetryable(status))
        );
    }
}

#[test]
fn rejection_messages_name_the_problem() {
    let msg = ManualRetryRejection::AttemptCapReached {
        attempts: 3,
        max_attempts: 3,
    }
    .to_string();
    assert!(msg.contains("reset_attempts=true"));
    assert!(ManualRetryRejection::NotRetryable(EventStatus::Processed)
        .to_string()
        .contains("processed"));
}

#[test]
fn scheduled_backoff_doubles_and_caps() {
    assert_eq!(retry_backoff(1, 30, 3600), Duration::from_secs(30));
    assert_eq!(retry_backoff(2, 30, 3600), Duration::from_secs(60));
    assert_eq!(retry_backoff(3, 30, 3600), Duration::from_secs(120));
    assert_eq!(retry_backoff(12, 30, 3600), Duration::from_secs(3600));
    assert_eq!(retry_backoff(0, 30, 3600), Duration::from_secs(30));
}

#[test]
fn only_payment_topics_are_settled() {
    assert!(is_settlement_topic("payment"));
    assert!(is_settlement_topic("payment.updated"));
    assert!(is_settlement_topic("payment.created"));
    assert!(!is_settlement_topic("merchant_order"));
    assert!(!is_settlement_topic("unknown"));
    assert!(!is_settlement_topic("invalid_json"));
}

#[test]
fn status_strings_round_trip_through_storage() {
    for status in [
        EventStatus::Pending,
        EventStatus::Processing,
        EventStatus::Processed,
        EventStatus::Error,
        EventStatus::Failed,
    ] {
        assert_eq!(EventStatus::parse(status.as_str()), Some(status));
    }
    assert!(EventStatus::Processed.is_terminal());
    assert!(EventStatus::Failed.is_terminal());
    assert!(!EventStatus::Error.is_terminal());
}

#[test]
fn health_thresholds() {
    assert_eq!(health_label(95.0), "healthy");
    assert_eq!(health_label(90.0), "warning");
    assert_eq!(health_label(75.5), "warning");
    assert_eq!(health_label(70.0), "critical");
}

#[test]
fn requeued_malformed_delivery_fails_validation_instead_of_being_ignored() {
    let stored = build_event(b"{not json", json!({}), None, SignatureState::Unknown, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(stored.status, EventStatus::Error);

    // Every later claim of the same row must keep failing.
    for _ in 0..DEFAULT_MAX_ATTEMPTS {
        match route_event(&stored.topic, &stored.raw_payload) {
            EventRoute::Malformed(message) => assert!(message.starts_with("invalid JSON"), "{message}"),
            other => panic!("malformed payload routed to {other:?}"),
        }
    }
}

#[test]
fn routes_follow_topic_once_the_payload_parses() {
    let body = br#"{"type": "payment", "data": {"id": "U1"}}"#;
    assert_eq!(route_event("payment", body), EventRoute::Settle);
    assert_eq!(
        route_event("merchant_order", br#"{"topic": "merchant_order", "data": {"id": "M1"}}"#),
        EventRoute::Ignore
    );
    assert!(matches!(route_event("invalid_json", body), EventRoute::Malformed(_)));
    assert!(matches!(route_event("payment", b"[1, 2]"), EventRoute::Malformed(_)));
}
