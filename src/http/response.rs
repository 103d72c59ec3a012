use crate::domain::payment::ErrorEnvelope;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorEnvelope::new(code, message))).into_response()
}

pub fn internal_error(err: anyhow::Error) -> Response {
    tracing::error!("request failed: {:#}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorEnvelope::new("INTERNAL_ERROR", "internal error").with_details(format!("{err:#}"))),
    )
        .into_response()
}

pub fn not_found(what: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
}
