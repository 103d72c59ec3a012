use payments_reconciler::audit::masking::{mask_headers, MASK};
use payments_reconciler::domain::webhook_event::EventStatus;
use payments_reconciler::intake::parser::{parse_notification, INVALID_JSON_TOPIC, UNKNOWN_TOPIC};
use payments_reconciler::intake::signature::{evaluate, sign, verify, SignatureState};
use payments_reconciler::service::intake_service::build_event;
use serde_json::json;

const SECRET: &str = "whsec_test";

#[test]
fn type_field_wins_over_topic() {
    let raw = br#"{"id": 981, "type": "payment", "topic": "merchant_order", "data": {"id": "U-77"}}"#;
    let parsed = parse_notification(raw).unwrap();
    assert_eq!(parsed.topic, "payment");
    assert_eq!(parsed.external_event_id.as_deref(), Some("981"));
    assert_eq!(parsed.gateway_payment_id.as_deref(), Some("U-77"));
}

#[test]
fn topic_is_used_when_type_is_missing() {
    let parsed = parse_notification(br#"{"topic": "merchant_order", "data": {"id": 1234567}}"#).unwrap();
    assert_eq!(parsed.topic, "merchant_order");
    assert_eq!(parsed.gateway_payment_id.as_deref(), Some("1234567"));
    assert_eq!(parsed.external_event_id, None);
}

#[test]
fn missing_topic_is_unknown() {
    let parsed = parse_notification(br#"{"data": {}}"#).unwrap();
    assert_eq!(parsed.topic, UNKNOWN_TOPIC);
    assert_eq!(parsed.gateway_payment_id, None);

    let blank = parse_notification(br#"{"type": "  ", "data": {"id": ""}}"#).unwrap();
    assert_eq!(blank.topic, UNKNOWN_TOPIC);
    assert_eq!(blank.gateway_payment_id, None);
}

#[test]
fn malformed_bodies_are_parse_failures() {
    let err = parse_notification(b"{not json").unwrap_err();
    assert!(err.message.starts_with("invalid JSON"));

    let err = parse_notification(b"[1, 2, 3]").unwrap_err();
    assert!(err.message.contains("not an object"));
}

#[test]
fn signatures_verify_with_or_without_prefix() {
    let body = br#"{"type":"payment","data":{"id":"1"}}"#;
    let digest = sign(SECRET, body);
    assert_eq!(digest.len(), 64);

    assert!(verify(SECRET, body, &digest));
    assert!(verify(SECRET, body, &format!("sha256={digest}")));
    assert!(!verify("other-secret", body, &digest));
    assert!(!verify(SECRET, br#"{"type":"payment","data":{"id":"2"}}"#, &digest));
    assert!(!verify(SECRET, body, "not-hex"));
}

#[test]
fn signature_state_depends_on_secret_and_header() {
    let body = b"{}";
    let good = sign(SECRET, body);

    assert_eq!(evaluate(Some(SECRET), body, Some(&good)), SignatureState::Valid);
    assert_eq!(evaluate(Some(SECRET), body, Some("deadbeef")), SignatureState::Invalid);
    assert_eq!(evaluate(Some(SECRET), body, None), SignatureState::Unknown);
    assert_eq!(evaluate(None, body, Some(&good)), SignatureState::Unknown);
    assert_eq!(evaluate(Some(""), body, Some(&good)), SignatureState::Unknown);

    assert_eq!(SignatureState::Valid.as_db(), Some(true));
    assert_eq!(SignatureState::Invalid.as_db(), Some(false));
    assert_eq!(SignatureState::Unknown.as_db(), None);
}

#[test]
fn valid_delivery_is_queued_pending() {
    let raw = br#"{"id": "evt-1", "type": "payment", "data": {"id": "U1"}}"#;
    let event = build_event(raw, json!({}), Some("10.0.0.5".into()), SignatureState::Valid, 3);

    assert_eq!(event.status, EventStatus::Pending);
    assert_eq!(event.topic, "payment");
    assert_eq!(event.external_event_id.as_deref(), Some("evt-1"));
    assert_eq!(event.gateway_payment_id.as_deref(), Some("U1"));
    assert_eq!(event.signature_valid, Some(true));
    assert_eq!(event.max_attempts, 3);
    assert_eq!(event.last_error, None);
    assert_eq!(event.raw_payload, raw.to_vec());
}

#[test]
fn unparseable_delivery_is_stored_as_error() {
    let raw = b"garbage";
    let event = build_event(raw, json!({}), None, SignatureState::Unknown, 3);

    assert_eq!(event.status, EventStatus::Error);
    assert_eq!(event.topic, INVALID_JSON_TOPIC);
    assert_eq!(event.raw_payload, raw.to_vec());
    assert!(event.last_error.unwrap().starts_with("invalid JSON"));
    assert_eq!(event.signature_valid, None);
}

#[test]
fn stored_headers_hide_credentials() {
    let headers = mask_headers([
        ("X-Signature", "sha256=abc"),
        ("Authorization", "Bearer abc"),
        ("Content-Type", "application/json"),
        ("X-Request-Id", "req-1"),
    ]);
    assert_eq!(headers["x-signature"], MASK);
    assert_eq!(headers["authorization"], MASK);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["x-request-id"], "req-1");
}
