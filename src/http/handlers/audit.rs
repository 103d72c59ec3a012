use crate::audit::verifier::verify_record;
use crate::domain::alert::{Alert, AlertType, Severity};
use crate::http::response::{internal_error, not_found};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

pub async fn verify_chain(State(state): State<AppState>, Query(range): Query<VerifyRange>) -> impl IntoResponse {
    let report = match state.audit_repo.verify_chain(range.from, range.to).await {
        Ok(report) => report,
        Err(e) => return internal_error(e),
    };

    if !report.valid {
        tracing::error!(
            first_diverging_block = ?report.first_diverging_block,
            failures = report.failures.len(),
            "audit chain verification failed"
        );
        state
            .alerts
            .raise(
                Alert::new(
                    AlertType::AuditChainIntegrityFailure,
                    Severity::Critical,
                    "Audit chain integrity failure",
                    format!(
                        "{} divergences, first at block {:?}",
                        report.failures.len(),
                        report.first_diverging_block
                    ),
                )
                .data(json!({
                    "from": range.from,
                    "to": range.to,
                    "first_diverging_block": report.first_diverging_block,
                    "failures": report.failures.iter().take(20).collect::<Vec<_>>(),
                })),
            )
            .await;
    }

    (StatusCode::OK, Json(report)).into_response()
}

pub async fn get_block(State(state): State<AppState>, Path(block): Path<i64>) -> impl IntoResponse {
    let record = match state.audit_repo.get_block(block).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found("audit block"),
        Err(e) => return internal_error(e),
    };

    let predecessor = if block > 1 {
        match state.audit_repo.block_hash(block - 1).await {
            Ok(hash) => hash,
            Err(e) => return internal_error(e),
        }
    } else {
        None
    };

    let check = verify_record(&record, predecessor.as_deref());
    (StatusCode::OK, Json(json!({"record": record, "verification": check}))).into_response()
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.audit_repo.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => internal_error(e),
    }
}
