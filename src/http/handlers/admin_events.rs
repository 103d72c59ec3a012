use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::domain::webhook_event::{health_label, plan_manual_retry, EventStatus};
use crate::http::response::{error_response, internal_error, not_found};
use crate::repo::audit_repo::AuditRepo;
use crate::repo::webhook_events_repo::{EventCounts, EventFilter, WebhookEventsRepo};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct RetryParams {
    #[serde(default)]
    pub reset_attempts: bool,
    pub requested_by: Option<String>,
}

pub async fn list_events(State(state): State<AppState>, Query(filter): Query<EventFilter>) -> impl IntoResponse {
    match state.events_repo.list(&filter).await {
        Ok(events) => (StatusCode::OK, Json(json!({"events": events, "count": events.len()}))).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn get_event(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.events_repo.get(id).await {
        Ok(Some(event)) => {
            let raw_payload = event.raw_payload_text();
            (StatusCode::OK, Json(json!({"event": event, "raw_payload": raw_payload}))).into_response()
        }
        Ok(None) => not_found("webhook event"),
        Err(e) => internal_error(e),
    }
}

/// Operator retry of an `error` or `failed` event.
pub async fn retry_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<RetryParams>,
) -> impl IntoResponse {
    match requeue(&state, id, &params).await {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(response)) => response,
        Err(e) => internal_error(e),
    }
}

async fn requeue(state: &AppState, id: i64, params: &RetryParams) -> anyhow::Result<Result<serde_json::Value, Response>> {
    let mut tx = state.pool.begin().await?;
    let Some(event) = WebhookEventsRepo::lock_tx(&mut tx, id).await? else {
        return Ok(Err(not_found("webhook event")));
    };

    let plan = match plan_manual_retry(event.status, event.attempts, event.max_attempts, params.reset_attempts) {
        Ok(plan) => plan,
        Err(rejection) => {
            return Ok(Err(error_response(StatusCode::CONFLICT, "RETRY_REJECTED", rejection.to_string())));
        }
    };

    WebhookEventsRepo::requeue_tx(&mut tx, id, plan.reset_attempts).await?;
    let actor = params.requested_by.clone().unwrap_or_else(|| "admin".to_string());
    AuditRepo::append_tx(
        &mut tx,
        NewAuditEntry::new(
            AuditAction::WebhookRetryRequested,
            actor,
            format!("event {id} requeued from {}", event.status.as_str()),
            json!({
                "event_id": id,
                "previous_status": event.status,
                "attempts": event.attempts,
                "max_attempts": event.max_attempts,
                "reset_attempts": plan.reset_attempts,
            }),
        )
        .for_payment(event.payment_id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(event_id = id, reset_attempts = plan.reset_attempts, "webhook event requeued");
    Ok(Ok(json!({
        "event_id": id,
        "status": EventStatus::Pending,
        "reset_attempts": plan.reset_attempts,
    })))
}

/// Share of stored events that reached `processed`.
pub fn success_rate(counts: &EventCounts) -> f64 {
    if counts.total == 0 {
        return 100.0;
    }
    let processed = counts
        .by_status
        .iter()
        .find(|c| c.key == EventStatus::Processed.as_str())
        .map(|c| c.count)
        .unwrap_or(0);
    let rate = processed as f64 / counts.total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.events_repo.counts().await {
        Ok(counts) => {
            let rate = success_rate(&counts);
            (
                StatusCode::OK,
                Json(json!({
                    "counts": counts,
                    "success_rate": rate,
                    "health": health_label(rate),
                })),
            )
                .into_response()
        }
        Err(e) => internal_error(e),
    }
}
