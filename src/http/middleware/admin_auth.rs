use crate::domain::payment::ErrorEnvelope;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const API_KEY_HEADER: &str = "X-Internal-Api-Key";

/// Compares through an HMAC so the check does not leak the key length or
/// prefix through timing.
pub fn key_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(b"admin-key") else {
        return false;
    };
    mac.update(expected.as_bytes());
    let expected_tag = mac.finalize().into_bytes();

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(b"admin-key") else {
        return false;
    };
    mac.update(provided.as_bytes());
    mac.verify_slice(&expected_tag).is_ok()
}

pub async fn require_internal_api_key(
    State(expected): State<String>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if !key_matches(&expected, provided) {
        tracing::warn!(path = %request.uri().path(), "admin request rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorEnvelope::new("UNAUTHORIZED", "missing or invalid internal API key")),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_key_is_accepted() {
        assert!(key_matches("s3cret", "s3cret"));
    }

    #[test]
    fn wrong_or_empty_keys_are_rejected() {
        assert!(!key_matches("s3cret", "s3cre"));
        assert!(!key_matches("s3cret", ""));
        assert!(!key_matches("", ""));
    }
}
