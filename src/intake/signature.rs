use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureState {
    Valid,
    Invalid,
    /// No secret configured or no signature header sent.
    Unknown,
}

impl SignatureState {
    pub fn as_db(&self) -> Option<bool> {
        match self {
            SignatureState::Valid => Some(true),
            SignatureState::Invalid => Some(false),
            SignatureState::Unknown => None,
        }
    }
}

pub fn sign(secret: &str, payload: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Accepts a bare hex digest or one prefixed with `sha256=`.
pub fn verify(secret: &str, payload: &[u8], provided: &str) -> bool {
    let provided = provided.trim();
    let hex_digest = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(provided_bytes) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&provided_bytes).is_ok()
}

pub fn evaluate(secret: Option<&str>, payload: &[u8], header: Option<&str>) -> SignatureState {
    match (secret.filter(|s| !s.is_empty()), header.filter(|h| !h.trim().is_empty())) {
        (Some(secret), Some(header)) => {
            if verify(secret, payload, header) {
                SignatureState::Valid
            } else {
                SignatureState::Invalid
            }
        }
        _ => SignatureState::Unknown,
    }
}
