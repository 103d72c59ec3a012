use crate::http::middleware::rate_limit::client_ip;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::net::SocketAddr;

/// Gateway notifications. Always acknowledged with 200 so the gateway does
/// not hammer us with redeliveries; correctness is checked by the worker.
pub async fn receive_gateway_webhook(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let forwarded = client_ip(&headers);
    let source_ip = if forwarded == "unknown" {
        peer.ip().to_string()
    } else {
        forwarded
    };

    let receipt = state.intake.enqueue(&body, &headers, Some(source_ip)).await;
    (StatusCode::OK, Json(receipt))
}
