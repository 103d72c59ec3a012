use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    WebhookProcessed,
    WebhookFailed,
    WebhookRetryRequested,
    DuplicatePaymentAttempt,
    AmountMismatch,
    SettlementConflict,
    PaymentRegistered,
    ReconciliationCorrection,
    ReconciliationCompleted,
    AlertResolved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::WebhookProcessed => "WEBHOOK_PROCESSED",
            AuditAction::WebhookFailed => "WEBHOOK_FAILED",
            AuditAction::WebhookRetryRequested => "WEBHOOK_RETRY_REQUESTED",
            AuditAction::DuplicatePaymentAttempt => "DUPLICATE_PAYMENT_ATTEMPT",
            AuditAction::AmountMismatch => "AMOUNT_MISMATCH",
            AuditAction::SettlementConflict => "SETTLEMENT_CONFLICT",
            AuditAction::PaymentRegistered => "PAYMENT_REGISTERED",
            AuditAction::ReconciliationCorrection => "RECONCILIATION_CORRECTION",
            AuditAction::ReconciliationCompleted => "RECONCILIATION_COMPLETED",
            AuditAction::AlertResolved => "ALERT_RESOLVED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub actor: String,
    pub description: String,
    pub payload: serde_json::Value,
    pub payment_id: Option<Uuid>,
    pub correlation_id: Option<String>,
}

impl NewAuditEntry {
    pub fn new(
        action: AuditAction,
        actor: impl Into<String>,
        description: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            action,
            actor: actor.into(),
            description: description.into(),
            payload,
            payment_id: None,
            correlation_id: None,
        }
    }

    pub fn for_payment(mut self, payment_id: Option<Uuid>) -> Self {
        self.payment_id = payment_id;
        self
    }

    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// One link of the audit chain. `payload` holds the masked canonical JSON
/// whose SHA-256 is `payload_checksum`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub block_number: i64,
    pub previous_hash: String,
    pub current_hash: String,
    pub action: String,
    pub actor: String,
    pub description: String,
    pub payload: String,
    pub payload_checksum: String,
    pub payment_id: Option<Uuid>,
    pub correlation_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
