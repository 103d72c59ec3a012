use crate::domain::audit::AuditAction;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment {0} not found at gateway")]
    NotFound(String),

    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    #[error("gateway rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Timeouts, network errors and 5xx responses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unreachable(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("payment has no downstream contact reference")]
    MissingContact,

    #[error("downstream unreachable: {0}")]
    Unreachable(String),

    #[error("downstream rejected settlement with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no payment matches correlation token {0}")]
    UnknownReference(String),

    #[error("amount mismatch: expected {expected}, gateway reported {actual}")]
    AmountMismatch { expected: Decimal, actual: Decimal },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ProcessingError {
    pub fn audit_action(&self) -> AuditAction {
        match self {
            ProcessingError::AmountMismatch { .. } => AuditAction::AmountMismatch,
            _ => AuditAction::WebhookFailed,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProcessingError::Validation(_) => "VALIDATION",
            ProcessingError::UnknownReference(_) => "UNKNOWN_REFERENCE",
            ProcessingError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            ProcessingError::Gateway(_) => "GATEWAY",
            ProcessingError::Storage(_) => "STORAGE",
        }
    }
}

impl From<sqlx::Error> for ProcessingError {
    fn from(err: sqlx::Error) -> Self {
        ProcessingError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for ProcessingError {
    fn from(err: anyhow::Error) -> Self {
        ProcessingError::Storage(format!("{err:#}"))
    }
}
