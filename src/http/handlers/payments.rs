use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::domain::payment::{Payment, RegisterPaymentRequest};
use crate::http::response::{error_response, internal_error, not_found};
use crate::repo::audit_repo::AuditRepo;
use crate::repo::payments_repo::PaymentsRepo;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

pub fn validate_registration(req: &RegisterPaymentRequest) -> Result<(), String> {
    if req.tenant_id.trim().is_empty() {
        return Err("tenant_id is required".to_string());
    }
    if req.expected_amount <= Decimal::ZERO {
        return Err("expected_amount must be positive".to_string());
    }
    if req.expected_amount.scale() > 2 {
        return Err("expected_amount has more than two decimals".to_string());
    }
    if req.currency.len() != 3 || !req.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err("currency must be a three-letter code".to_string());
    }
    Ok(())
}

/// Registers an expected payment. Its id is the correlation token handed
/// to the gateway as the external reference.
pub async fn register_payment(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterPaymentRequest>,
) -> impl IntoResponse {
    req.currency = req.currency.trim().to_ascii_uppercase();
    if let Err(message) = validate_registration(&req) {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message);
    }

    match register(&state, &req).await {
        Ok(payment) => {
            tracing::info!(payment_id = %payment.id, tenant_id = %payment.tenant_id, "payment registered");
            (StatusCode::CREATED, Json(payment)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn register(state: &AppState, req: &RegisterPaymentRequest) -> anyhow::Result<Payment> {
    let mut tx = state.pool.begin().await?;
    let payment = PaymentsRepo::insert_tx(&mut tx, req).await?;
    AuditRepo::append_tx(
        &mut tx,
        NewAuditEntry::new(
            AuditAction::PaymentRegistered,
            "admin",
            format!("expected payment of {} {} registered", payment.expected_amount, payment.currency),
            json!({
                "tenant_id": payment.tenant_id,
                "contact_ref": payment.contact_ref,
                "expected_amount": payment.expected_amount,
                "currency": payment.currency,
            }),
        )
        .for_payment(Some(payment.id))
        .correlated(payment.correlation_token.clone()),
    )
    .await?;
    tx.commit().await?;
    Ok(payment)
}

pub async fn get_payment(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.payments_repo.get(id).await {
        Ok(Some(payment)) => (StatusCode::OK, Json(payment)).into_response(),
        Ok(None) => not_found("payment"),
        Err(e) => internal_error(e),
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
