use crate::http::response::{error_response, internal_error, not_found};
use crate::reconciliation::settings::SettingsOverride;
use crate::service::reconciliation_service::ReconciliationError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    pub format: Option<String>,
}

/// Runs reconciliation now and answers with the run's summary.
pub async fn run_now(State(state): State<AppState>, body: Option<Json<SettingsOverride>>) -> impl IntoResponse {
    let overrides = body.map(|Json(o)| o).unwrap_or_default();
    let settings = state.recon_settings.clone().with_override(&overrides);
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    match state.reconciliation.run(settings, cancel_rx).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "run_id": report.run_id,
                "status": report.status,
                "cancelled": report.cancelled,
                "duration_ms": report.duration_ms,
                "summary": report.summary,
            })),
        )
            .into_response(),
        Err(ReconciliationError::AlreadyRunning) => error_response(
            StatusCode::CONFLICT,
            "RECONCILIATION_RUNNING",
            "a reconciliation run is already in progress",
        ),
        Err(ReconciliationError::Aborted(e)) => internal_error(e),
    }
}

pub async fn list_reports(State(state): State<AppState>, Query(params): Query<ListParams>) -> impl IntoResponse {
    match state.reports_repo.list(params.limit.unwrap_or(20)).await {
        Ok(reports) => (StatusCode::OK, Json(json!({"reports": reports}))).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(params): Query<ReportParams>,
) -> impl IntoResponse {
    let report = match state.reports_repo.get(&run_id).await {
        Ok(Some(report)) => report,
        Ok(None) => return not_found("reconciliation report"),
        Err(e) => return internal_error(e),
    };

    if params.format.as_deref() == Some("csv") {
        let disposition = format!("attachment; filename=\"reconciliation_{}.csv\"", report.run_id);
        return (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            report.report_csv,
        )
            .into_response();
    }

    (StatusCode::OK, Json(report.report_json)).into_response()
}
