use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    InProcess,
    Approved,
    Rejected,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Maps a status string as stored or as reported by the gateway.
    /// Gateway-only states such as `refunded` yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "in_process" | "in_mediation" | "authorized" => Some(PaymentStatus::InProcess),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            "cancelled" | "canceled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved | PaymentStatus::Rejected | PaymentStatus::Cancelled
        )
    }

    /// Not yet confirmed by the gateway.
    pub fn is_unconfirmed(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub gateway_payment_id: Option<String>,
    pub correlation_token: String,
    pub tenant_id: String,
    pub contact_ref: Option<String>,
    pub expected_amount: Decimal,
    pub currency: String,
    pub settled_amount: Option<Decimal>,
    pub status: PaymentStatus,
    pub settlement_method: Option<String>,
    pub status_detail: Option<String>,
    pub is_downstream_synced: bool,
    pub settlement_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterPaymentRequest {
    pub tenant_id: String,
    pub contact_ref: Option<String>,
    pub expected_amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "ARS".to_string()
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorPayload {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.error.details = Some(details.into());
        self
    }
}

/// Fields written when the gateway's verdict is applied to a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementUpdate {
    pub status: PaymentStatus,
    pub settled_amount: Option<Decimal>,
    pub settlement_method: Option<String>,
    pub status_detail: Option<String>,
    /// Bound only for terminal statuses; it is the idempotency key.
    pub gateway_payment_id: Option<String>,
}
