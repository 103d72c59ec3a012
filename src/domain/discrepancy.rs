use crate::domain::alert::Severity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    AmountMismatch,
    StatusMismatchApproved,
    StatusMismatchRejected,
    DownstreamNotUpdated,
    GatewayUnreachable,
    ProcessingError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    None,
    ApplyApproval,
    ApplyRejection,
    RetryDownstreamSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionPolicy {
    pub severity: Severity,
    pub auto_correctable: bool,
    pub correction: Correction,
}

impl DiscrepancyKind {
    pub const ALL: [DiscrepancyKind; 6] = [
        DiscrepancyKind::AmountMismatch,
        DiscrepancyKind::StatusMismatchApproved,
        DiscrepancyKind::StatusMismatchRejected,
        DiscrepancyKind::DownstreamNotUpdated,
        DiscrepancyKind::GatewayUnreachable,
        DiscrepancyKind::ProcessingError,
    ];

    pub const fn policy(self) -> CorrectionPolicy {
        match self {
            DiscrepancyKind::AmountMismatch => CorrectionPolicy {
                severity: Severity::High,
                auto_correctable: false,
                correction: Correction::None,
            },
            DiscrepancyKind::StatusMismatchApproved => CorrectionPolicy {
                severity: Severity::Medium,
                auto_correctable: true,
                correction: Correction::ApplyApproval,
            },
            DiscrepancyKind::StatusMismatchRejected => CorrectionPolicy {
                severity: Severity::Low,
                auto_correctable: true,
                correction: Correction::ApplyRejection,
            },
            DiscrepancyKind::DownstreamNotUpdated => CorrectionPolicy {
                severity: Severity::Critical,
                auto_correctable: true,
                correction: Correction::RetryDownstreamSync,
            },
            DiscrepancyKind::GatewayUnreachable => CorrectionPolicy {
                severity: Severity::High,
                auto_correctable: false,
                correction: Correction::None,
            },
            DiscrepancyKind::ProcessingError => CorrectionPolicy {
                severity: Severity::High,
                auto_correctable: false,
                correction: Correction::None,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyKind::AmountMismatch => "AMOUNT_MISMATCH",
            DiscrepancyKind::StatusMismatchApproved => "STATUS_MISMATCH_APPROVED",
            DiscrepancyKind::StatusMismatchRejected => "STATUS_MISMATCH_REJECTED",
            DiscrepancyKind::DownstreamNotUpdated => "DOWNSTREAM_NOT_UPDATED",
            DiscrepancyKind::GatewayUnreachable => "GATEWAY_UNREACHABLE",
            DiscrepancyKind::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Discrepancy {
    pub payment_id: Uuid,
    pub gateway_payment_id: Option<String>,
    pub tenant_id: String,
    pub kind: DiscrepancyKind,
    pub expected_value: String,
    pub actual_value: String,
    pub expected_amount: Option<Decimal>,
    pub actual_amount: Option<Decimal>,
    pub severity: Severity,
    pub auto_correctable: bool,
    pub correction_applied: bool,
    pub description: String,
    pub error_message: Option<String>,
}

impl Discrepancy {
    /// Builds a discrepancy whose severity and correctability come from the
    /// kind's policy.
    pub fn new(
        kind: DiscrepancyKind,
        payment_id: Uuid,
        tenant_id: &str,
        gateway_payment_id: Option<String>,
        expected_value: impl Into<String>,
        actual_value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let policy = kind.policy();
        Self {
            payment_id,
            gateway_payment_id,
            tenant_id: tenant_id.to_string(),
            kind,
            expected_value: expected_value.into(),
            actual_value: actual_value.into(),
            expected_amount: None,
            actual_amount: None,
            severity: policy.severity,
            auto_correctable: policy.auto_correctable,
            correction_applied: false,
            description: description.into(),
            error_message: None,
        }
    }

    pub fn with_amounts(mut self, expected: Decimal, actual: Option<Decimal>) -> Self {
        self.expected_amount = Some(expected);
        self.actual_amount = actual;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn correction(&self) -> Correction {
        self.kind.policy().correction
    }
}
