use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    InvalidWebhookSignature,
    DuplicatePaymentAttempt,
    UnknownPaymentReference,
    AmountMismatch,
    WebhookProcessingFailed,
    SettlementConflict,
    ReconciliationDiscrepancy,
    ReconciliationCriticalError,
    AuditChainIntegrityFailure,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::InvalidWebhookSignature => "INVALID_WEBHOOK_SIGNATURE",
            AlertType::DuplicatePaymentAttempt => "DUPLICATE_PAYMENT_ATTEMPT",
            AlertType::UnknownPaymentReference => "UNKNOWN_PAYMENT_REFERENCE",
            AlertType::AmountMismatch => "AMOUNT_MISMATCH",
            AlertType::WebhookProcessingFailed => "WEBHOOK_PROCESSING_FAILED",
            AlertType::SettlementConflict => "SETTLEMENT_CONFLICT",
            AlertType::ReconciliationDiscrepancy => "RECONCILIATION_DISCREPANCY",
            AlertType::ReconciliationCriticalError => "RECONCILIATION_CRITICAL_ERROR",
            AlertType::AuditChainIntegrityFailure => "AUDIT_CHAIN_INTEGRITY_FAILURE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub source_ip: Option<String>,
    pub payment_id: Option<Uuid>,
    pub data: serde_json::Value,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            severity,
            title: title.into(),
            message: message.into(),
            expected_value: None,
            actual_value: None,
            source_ip: None,
            payment_id: None,
            data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn values(mut self, expected: impl ToString, actual: impl ToString) -> Self {
        self.expected_value = Some(expected.to_string());
        self.actual_value = Some(actual.to_string());
        self
    }

    pub fn payment(mut self, payment_id: Uuid) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn source_ip(mut self, ip: Option<String>) -> Self {
        self.source_ip = ip;
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Alert row as persisted.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAlert {
    pub id: i64,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub source_ip: Option<String>,
    pub payment_id: Option<Uuid>,
    pub data: serde_json::Value,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
