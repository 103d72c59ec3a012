use crate::alerts::AlertDispatcher;
use crate::audit::masking::mask_headers;
use crate::domain::alert::{Alert, AlertType, Severity};
use crate::domain::webhook_event::{EventStatus, NewWebhookEvent};
use crate::intake::parser::{parse_notification, INVALID_JSON_TOPIC};
use crate::intake::signature::{evaluate, SignatureState, SIGNATURE_HEADER};
use crate::repo::webhook_events_repo::WebhookEventsRepo;
use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStatus {
    Queued,
    Error,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeReceipt {
    pub received: bool,
    pub event_id: Option<i64>,
    pub status: IntakeStatus,
}

/// Builds the row stored for a raw delivery. No I/O.
pub fn build_event(
    raw: &[u8],
    headers: serde_json::Value,
    source_ip: Option<String>,
    signature: SignatureState,
    max_attempts: i32,
) -> NewWebhookEvent {
    match parse_notification(raw) {
        Ok(parsed) => NewWebhookEvent {
            external_event_id: parsed.external_event_id,
            topic: parsed.topic,
            raw_payload: raw.to_vec(),
            headers,
            source_ip,
            signature_valid: signature.as_db(),
            status: EventStatus::Pending,
            max_attempts,
            last_error: None,
            gateway_payment_id: parsed.gateway_payment_id,
        },
        Err(failure) => NewWebhookEvent {
            external_event_id: None,
            topic: INVALID_JSON_TOPIC.to_string(),
            raw_payload: raw.to_vec(),
            headers,
            source_ip,
            signature_valid: signature.as_db(),
            status: EventStatus::Error,
            max_attempts,
            last_error: Some(failure.message),
            gateway_payment_id: None,
        },
    }
}

#[derive(Clone)]
pub struct IntakeService {
    pub events_repo: WebhookEventsRepo,
    pub alerts: AlertDispatcher,
    pub webhook_secret: Option<String>,
    pub max_attempts: i32,
}

impl IntakeService {
    /// Stores the delivery and acknowledges it. Never calls the gateway.
    pub async fn enqueue(&self, raw: &[u8], headers: &HeaderMap, source_ip: Option<String>) -> IntakeReceipt {
        let signature_header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        let signature = evaluate(self.webhook_secret.as_deref(), raw, signature_header);

        let stored_headers = mask_headers(
            headers
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        );

        let event = build_event(raw, stored_headers, source_ip.clone(), signature, self.max_attempts);
        let status = if event.status == EventStatus::Error {
            IntakeStatus::Error
        } else {
            IntakeStatus::Queued
        };

        let event_id = match self.events_repo.insert(&event).await {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(topic = %event.topic, "failed to store webhook delivery: {:#}", err);
                return IntakeReceipt {
                    received: true,
                    event_id: None,
                    status: IntakeStatus::Unavailable,
                };
            }
        };

        if signature == SignatureState::Invalid {
            self.alerts
                .raise(
                    Alert::new(
                        AlertType::InvalidWebhookSignature,
                        Severity::High,
                        "Invalid webhook signature",
                        format!("webhook event {event_id} failed signature validation"),
                    )
                    .source_ip(source_ip)
                    .data(json!({"event_id": event_id, "topic": event.topic})),
                )
                .await;
        }

        tracing::info!(event_id, topic = %event.topic, signature = ?signature, "webhook delivery stored");
        IntakeReceipt {
            received: true,
            event_id: Some(event_id),
            status,
        }
    }
}
