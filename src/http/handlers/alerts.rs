use crate::domain::alert::Severity;
use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::http::response::{error_response, internal_error, not_found};
use crate::repo::alerts_repo::AlertsRepo;
use crate::repo::audit_repo::AuditRepo;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
    pub notes: Option<String>,
}

pub async fn list_alerts(State(state): State<AppState>, Query(query): Query<AlertQuery>) -> impl IntoResponse {
    let severity = match query.severity.as_deref() {
        Some(raw) => match Severity::parse(&raw.trim().to_ascii_uppercase()) {
            Some(s) => Some(s.as_str()),
            None => {
                return error_response(StatusCode::BAD_REQUEST, "INVALID_SEVERITY", format!("unknown severity {raw}"))
            }
        },
        None => None,
    };

    match state.alerts_repo.list_unresolved(severity, query.limit.unwrap_or(100)).await {
        Ok(alerts) => (StatusCode::OK, Json(json!({"alerts": alerts, "count": alerts.len()}))).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> impl IntoResponse {
    if req.resolved_by.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "resolved_by is required");
    }

    match resolve(&state, id, &req).await {
        Ok(true) => (StatusCode::OK, Json(json!({"alert_id": id, "resolved": true}))).into_response(),
        Ok(false) => not_found("unresolved alert"),
        Err(e) => internal_error(e),
    }
}

async fn resolve(state: &AppState, id: i64, req: &ResolveRequest) -> anyhow::Result<bool> {
    let mut tx = state.pool.begin().await?;
    if !AlertsRepo::resolve_tx(&mut tx, id, &req.resolved_by, req.notes.as_deref()).await? {
        return Ok(false);
    }
    AuditRepo::append_tx(
        &mut tx,
        NewAuditEntry::new(
            AuditAction::AlertResolved,
            req.resolved_by.clone(),
            format!("alert {id} resolved"),
            json!({"alert_id": id, "notes": req.notes}),
        ),
    )
    .await?;
    tx.commit().await?;
    Ok(true)
}
