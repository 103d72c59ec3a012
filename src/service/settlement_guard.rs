use crate::domain::money::amounts_match;
use crate::domain::payment::{Payment, PaymentStatus, SettlementUpdate};
use crate::domain::webhook_event::{is_settlement_topic, status_after_failure, EventStatus};
use crate::error::ProcessingError;
use crate::gateways::GatewayPayment;
use crate::intake::parser::{parse_notification, INVALID_JSON_TOPIC};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementDecision {
    Apply(SettlementUpdate),
    AlreadyFinal {
        current: PaymentStatus,
        reported: PaymentStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTransition {
    pub status: EventStatus,
    pub exhausted: bool,
}

/// Where a claimed event goes before any lookup happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    Settle,
    Ignore,
    /// The stored payload does not parse; the event fails validation.
    Malformed(String),
}

pub fn route_event(topic: &str, raw_payload: &[u8]) -> EventRoute {
    match parse_notification(raw_payload) {
        Err(failure) => EventRoute::Malformed(failure.message),
        Ok(_) if topic == INVALID_JSON_TOPIC => EventRoute::Malformed("invalid JSON payload".to_string()),
        Ok(_) if is_settlement_topic(topic) => EventRoute::Settle,
        Ok(_) => EventRoute::Ignore,
    }
}

pub fn failure_transition(attempts: i32, max_attempts: i32) -> FailureTransition {
    let status = status_after_failure(attempts, max_attempts);
    FailureTransition {
        status,
        exhausted: status == EventStatus::Failed,
    }
}

/// Amount guard. An approval without a reported amount never passes.
pub fn check_amount(
    expected: Decimal,
    reported: Option<Decimal>,
    status: PaymentStatus,
    tolerance: Decimal,
) -> Result<(), ProcessingError> {
    match reported {
        Some(actual) if !amounts_match(expected, actual, tolerance) => {
            Err(ProcessingError::AmountMismatch { expected, actual })
        }
        None if status == PaymentStatus::Approved => Err(ProcessingError::AmountMismatch {
            expected,
            actual: Decimal::ZERO,
        }),
        _ => Ok(()),
    }
}

/// Decides what a gateway notification does to `payment`.
pub fn decide_settlement(
    payment: &Payment,
    gateway: &GatewayPayment,
    tolerance: Decimal,
) -> Result<SettlementDecision, ProcessingError> {
    let reported = gateway.payment_status().ok_or_else(|| {
        ProcessingError::Validation(format!("unsupported gateway status {}", gateway.status))
    })?;

    check_amount(payment.expected_amount, gateway.settled_amount, reported, tolerance)?;

    if payment.status.is_terminal() {
        return Ok(SettlementDecision::AlreadyFinal {
            current: payment.status,
            reported,
        });
    }

    let update = if reported.is_terminal() {
        SettlementUpdate {
            status: reported,
            settled_amount: if reported == PaymentStatus::Approved {
                gateway.settled_amount
            } else {
                None
            },
            settlement_method: gateway.payment_method.clone(),
            status_detail: gateway.status_detail.clone(),
            gateway_payment_id: Some(gateway.gateway_payment_id.clone()),
        }
    } else {
        SettlementUpdate {
            status: PaymentStatus::InProcess,
            settled_amount: None,
            settlement_method: gateway.payment_method.clone(),
            status_detail: gateway.status_detail.clone(),
            gateway_payment_id: None,
        }
    };

    Ok(SettlementDecision::Apply(update))
}
