use crate::domain::discrepancy::{Discrepancy, DiscrepancyKind};
use crate::domain::money::amounts_match;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::gateways::GatewayPayment;
use rust_decimal::Decimal;

/// Compares a stored payment with the gateway's record. First match wins;
/// the amount check runs before any approval is accepted.
pub fn classify(payment: &Payment, gateway: &GatewayPayment, tolerance: Decimal) -> Option<Discrepancy> {
    let gateway_status = gateway.payment_status()?;
    let gateway_id = Some(gateway.gateway_payment_id.clone());

    match gateway_status {
        PaymentStatus::Approved => {
            let actual = gateway.settled_amount;
            let amount_ok = actual
                .map(|a| amounts_match(payment.expected_amount, a, tolerance))
                .unwrap_or(false);
            let under_review = payment.status.is_unconfirmed()
                || (payment.status == PaymentStatus::Approved && !payment.is_downstream_synced);

            if under_review && !amount_ok {
                let shown = actual.map(|a| a.to_string()).unwrap_or_else(|| "missing".to_string());
                return Some(
                    Discrepancy::new(
                        DiscrepancyKind::AmountMismatch,
                        payment.id,
                        &payment.tenant_id,
                        gateway_id,
                        payment.expected_amount.to_string(),
                        shown.clone(),
                        format!(
                            "gateway approved {} but {} was expected",
                            shown, payment.expected_amount
                        ),
                    )
                    .with_amounts(payment.expected_amount, actual),
                );
            }

            if payment.status.is_unconfirmed() {
                return Some(
                    Discrepancy::new(
                        DiscrepancyKind::StatusMismatchApproved,
                        payment.id,
                        &payment.tenant_id,
                        gateway_id,
                        PaymentStatus::Approved.as_str(),
                        payment.status.as_str(),
                        "payment approved at gateway but not internally",
                    )
                    .with_amounts(payment.expected_amount, actual),
                );
            }

            if payment.status == PaymentStatus::Approved && !payment.is_downstream_synced {
                return Some(Discrepancy::new(
                    DiscrepancyKind::DownstreamNotUpdated,
                    payment.id,
                    &payment.tenant_id,
                    gateway_id,
                    "synced",
                    "not_synced",
                    "approved payment was never synced downstream",
                ));
            }

            None
        }
        PaymentStatus::Rejected | PaymentStatus::Cancelled if payment.status.is_unconfirmed() => {
            Some(Discrepancy::new(
                DiscrepancyKind::StatusMismatchRejected,
                payment.id,
                &payment.tenant_id,
                gateway_id,
                gateway_status.as_str(),
                payment.status.as_str(),
                format!("payment {} at gateway but not internally", gateway_status),
            ))
        }
        _ => None,
    }
}

pub fn gateway_unreachable(payment: &Payment, error: &str) -> Discrepancy {
    Discrepancy::new(
        DiscrepancyKind::GatewayUnreachable,
        payment.id,
        &payment.tenant_id,
        payment.gateway_payment_id.clone(),
        "reachable",
        "unreachable",
        "gateway could not be queried after retries",
    )
    .with_error(error)
}

pub fn processing_error(payment: &Payment, gateway_payment_id: Option<String>, error: &str) -> Discrepancy {
    Discrepancy::new(
        DiscrepancyKind::ProcessingError,
        payment.id,
        &payment.tenant_id,
        gateway_payment_id.or_else(|| payment.gateway_payment_id.clone()),
        "processed",
        "error",
        "unexpected failure while reconciling payment",
    )
    .with_error(error)
}
