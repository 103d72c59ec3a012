use crate::alerts::AlertDispatcher;
use crate::domain::alert::{Alert, AlertType, Severity};
use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::webhook_event::{Annotation, WebhookEvent};
use crate::downstream::{DownstreamSync, SettlementSync};
use crate::error::{GatewayError, ProcessingError, SyncError};
use crate::gateways::{GatewayPayment, PaymentGateway};
use crate::intake::parser::gateway_payment_id;
use crate::repo::audit_repo::AuditRepo;
use crate::repo::payments_repo::PaymentsRepo;
use crate::repo::webhook_events_repo::WebhookEventsRepo;
use crate::service::settlement_guard::{
    decide_settlement, failure_transition, route_event, EventRoute, FailureTransition, SettlementDecision,
};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const ACTOR: &str = "webhook_processor";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    IgnoredTopic,
    Duplicate { payment_id: Uuid },
    Settled { payment_id: Uuid, status: PaymentStatus, downstream_synced: bool },
    AlreadyFinal { payment_id: Uuid },
    Failed(FailureTransition),
    /// The claim expired before the outcome was written; nothing was kept.
    ClaimLost,
}

#[derive(Debug)]
struct Failure {
    error: ProcessingError,
    payment_id: Option<Uuid>,
}

impl From<ProcessingError> for Failure {
    fn from(error: ProcessingError) -> Self {
        Failure {
            error,
            payment_id: None,
        }
    }
}

impl From<sqlx::Error> for Failure {
    fn from(err: sqlx::Error) -> Self {
        ProcessingError::from(err).into()
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        ProcessingError::from(err).into()
    }
}

async fn abandon_lost_claim(tx: Transaction<'_, Postgres>, event_id: i64) -> Result<Outcome, sqlx::Error> {
    tx.rollback().await?;
    tracing::warn!(event_id, "claim no longer held, outcome rolled back");
    Ok(Outcome::ClaimLost)
}

fn for_payment(payment_id: Uuid) -> impl FnOnce(ProcessingError) -> Failure {
    move |error| Failure {
        error,
        payment_id: Some(payment_id),
    }
}

#[derive(Clone)]
pub struct WebhookProcessor {
    pub pool: PgPool,
    pub payments_repo: PaymentsRepo,
    pub gateway: Arc<dyn PaymentGateway>,
    pub downstream: Arc<dyn DownstreamSync>,
    pub alerts: AlertDispatcher,
    pub amount_tolerance: Decimal,
    pub gateway_timeout: Duration,
    pub sync_timeout: Duration,
}

impl WebhookProcessor {
    /// Runs one claimed event to `processed`, `error` or `failed`. An `Err`
    /// means the outcome could not be recorded; the event then stays
    /// `processing` until its lease expires.
    #[tracing::instrument(
        name = "process_webhook_event",
        skip_all,
        fields(event_id = event.id, attempt = event.attempts, topic = %event.topic)
    )]
    pub async fn process(&self, event: &WebhookEvent) -> anyhow::Result<Outcome> {
        match self.handle(event).await {
            Ok(outcome) => {
                tracing::info!(?outcome, "webhook event processed");
                Ok(outcome)
            }
            Err(failure) => self.record_failure(event, failure).await,
        }
    }

    async fn handle(&self, event: &WebhookEvent) -> Result<Outcome, Failure> {
        match route_event(&event.topic, &event.raw_payload) {
            EventRoute::Malformed(message) => return Err(ProcessingError::Validation(message).into()),
            EventRoute::Ignore => {
                let mut tx = self.pool.begin().await?;
                if !WebhookEventsRepo::mark_processed_tx(&mut tx, event.id, Some(Annotation::IgnoredTopic), None, None)
                    .await?
                {
                    return Ok(abandon_lost_claim(tx, event.id).await?);
                }
                tx.commit().await?;
                return Ok(Outcome::IgnoredTopic);
            }
            EventRoute::Settle => {}
        }

        let gateway_id = event
            .gateway_payment_id
            .clone()
            .or_else(|| {
                serde_json::from_slice::<serde_json::Value>(&event.raw_payload)
                    .ok()
                    .and_then(|v| gateway_payment_id(&v))
            })
            .ok_or_else(|| ProcessingError::Validation("notification carries no payment id".to_string()))?;

        if let Some(existing) = self.payments_repo.find_by_gateway_id(&gateway_id).await? {
            return self.finish_duplicate(event, existing.id, &gateway_id).await;
        }

        let details = self.fetch_details(&gateway_id).await?;
        let token = details.correlation_token.clone().ok_or_else(|| {
            ProcessingError::Validation(format!("gateway payment {gateway_id} has no external reference"))
        })?;

        let Some(payment) = self.payments_repo.find_by_correlation(&token).await? else {
            self.alerts
                .raise(
                    Alert::new(
                        AlertType::UnknownPaymentReference,
                        Severity::High,
                        "Unknown payment reference",
                        format!("gateway payment {gateway_id} references unknown token {token}"),
                    )
                    .source_ip(event.source_ip.clone())
                    .data(json!({"event_id": event.id, "gateway_payment_id": gateway_id, "correlation_token": token})),
                )
                .await;
            return Err(ProcessingError::UnknownReference(token).into());
        };

        if let Err(err) = decide_settlement(&payment, &details, self.amount_tolerance) {
            if let ProcessingError::AmountMismatch { expected, actual } = &err {
                self.alerts
                    .raise_once_per_event(
                        Alert::new(
                            AlertType::AmountMismatch,
                            Severity::Critical,
                            "Settlement amount mismatch",
                            format!("gateway payment {gateway_id} settled {actual}, expected {expected}"),
                        )
                        .values(expected, actual)
                        .payment(payment.id)
                        .data(json!({"event_id": event.id, "gateway_payment_id": gateway_id})),
                        event.id,
                    )
                    .await;
            }
            return Err(for_payment(payment.id)(err));
        }

        self.settle(event, &payment, &details, &gateway_id).await
    }

    async fn fetch_details(&self, gateway_id: &str) -> Result<GatewayPayment, ProcessingError> {
        match tokio::time::timeout(self.gateway_timeout, self.gateway.get_payment(gateway_id)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GatewayError::Unreachable("gateway call timed out".to_string()).into()),
        }
    }

    async fn sync_downstream(&self, request: &SettlementSync) -> Result<(), SyncError> {
        match tokio::time::timeout(self.sync_timeout, self.downstream.sync_settlement(request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Unreachable("downstream call timed out".to_string())),
        }
    }

    async fn settle(
        &self,
        event: &WebhookEvent,
        payment: &Payment,
        details: &GatewayPayment,
        gateway_id: &str,
    ) -> Result<Outcome, Failure> {
        let on_payment = || for_payment(payment.id);
        let mut tx = self.pool.begin().await?;

        let locked = PaymentsRepo::lock_tx(&mut tx, payment.id)
            .await?
            .ok_or_else(|| on_payment()(ProcessingError::UnknownReference(payment.correlation_token.clone())))?;

        if let Some(owner) = PaymentsRepo::gateway_id_taken_tx(&mut tx, gateway_id).await? {
            tx.rollback().await?;
            return self.finish_duplicate(event, owner, gateway_id).await;
        }

        // The row may have moved since it was read without the lock.
        let decision = decide_settlement(&locked, details, self.amount_tolerance).map_err(on_payment())?;

        match decision {
            SettlementDecision::AlreadyFinal { current, reported } => {
                let marked = WebhookEventsRepo::mark_processed_tx(
                    &mut tx,
                    event.id,
                    Some(Annotation::AlreadyFinal),
                    Some(locked.id),
                    Some(gateway_id),
                )
                .await?;
                if !marked {
                    return Ok(abandon_lost_claim(tx, event.id).await?);
                }
                let conflict = current != reported;
                let action = if conflict {
                    AuditAction::SettlementConflict
                } else {
                    AuditAction::WebhookProcessed
                };
                AuditRepo::append_tx(
                    &mut tx,
                    NewAuditEntry::new(
                        action,
                        ACTOR,
                        format!("payment already {current}; gateway reports {reported}"),
                        json!({
                            "event_id": event.id,
                            "gateway_payment_id": gateway_id,
                            "current_status": current,
                            "reported_status": reported,
                        }),
                    )
                    .for_payment(Some(locked.id))
                    .correlated(gateway_id),
                )
                .await?;
                tx.commit().await?;

                if conflict {
                    self.alerts
                        .raise(
                            Alert::new(
                                AlertType::SettlementConflict,
                                Severity::High,
                                "Settlement conflict",
                                format!("payment is {current} but gateway payment {gateway_id} is {reported}"),
                            )
                            .values(current, reported)
                            .payment(locked.id),
                        )
                        .await;
                }
                Ok(Outcome::AlreadyFinal { payment_id: locked.id })
            }
            SettlementDecision::Apply(update) => {
                let applied = PaymentsRepo::apply_settlement_tx(&mut tx, locked.id, locked.status, &update).await?;
                if !applied {
                    return Err(on_payment()(ProcessingError::Storage(
                        "payment changed while locked".to_string(),
                    )));
                }

                // Checked before the downstream call so a lost claim never syncs.
                let annotation = (!update.status.is_terminal()).then_some(Annotation::AwaitingFinalStatus);
                if !WebhookEventsRepo::mark_processed_tx(&mut tx, event.id, annotation, Some(locked.id), Some(gateway_id))
                    .await?
                {
                    return Ok(abandon_lost_claim(tx, event.id).await?);
                }

                let mut downstream_synced = false;
                let mut downstream_error = None;
                if update.status == PaymentStatus::Approved {
                    let amount = update.settled_amount.unwrap_or(locked.expected_amount);
                    let request = SettlementSync::for_payment(&locked, gateway_id, amount);
                    match self.sync_downstream(&request).await {
                        Ok(()) => {
                            downstream_synced = PaymentsRepo::mark_synced_tx(&mut tx, locked.id).await?;
                        }
                        Err(err) => {
                            tracing::warn!(payment_id = %locked.id, "downstream sync failed: {}", err);
                            downstream_error = Some(err.to_string());
                        }
                    }
                }

                AuditRepo::append_tx(
                    &mut tx,
                    NewAuditEntry::new(
                        AuditAction::WebhookProcessed,
                        ACTOR,
                        format!("payment {} -> {} from gateway payment {}", locked.status, update.status, gateway_id),
                        json!({
                            "event_id": event.id,
                            "gateway_payment_id": gateway_id,
                            "previous_status": locked.status,
                            "status": update.status,
                            "settled_amount": update.settled_amount,
                            "settlement_method": update.settlement_method,
                            "downstream_synced": downstream_synced,
                            "downstream_error": downstream_error,
                        }),
                    )
                    .for_payment(Some(locked.id))
                    .correlated(gateway_id),
                )
                .await?;
                tx.commit().await?;

                tracing::info!(
                    payment_id = %locked.id,
                    gateway_payment_id = gateway_id,
                    status = %update.status,
                    downstream_synced,
                    "settlement applied"
                );
                Ok(Outcome::Settled {
                    payment_id: locked.id,
                    status: update.status,
                    downstream_synced,
                })
            }
        }
    }

    async fn finish_duplicate(
        &self,
        event: &WebhookEvent,
        payment_id: Uuid,
        gateway_id: &str,
    ) -> Result<Outcome, Failure> {
        let mut tx = self.pool.begin().await?;
        let marked = WebhookEventsRepo::mark_processed_tx(
            &mut tx,
            event.id,
            Some(Annotation::Duplicate),
            Some(payment_id),
            Some(gateway_id),
        )
        .await?;
        if !marked {
            return Ok(abandon_lost_claim(tx, event.id).await?);
        }
        AuditRepo::append_tx(
            &mut tx,
            NewAuditEntry::new(
                AuditAction::DuplicatePaymentAttempt,
                ACTOR,
                format!("gateway payment {gateway_id} already applied"),
                json!({"event_id": event.id, "gateway_payment_id": gateway_id}),
            )
            .for_payment(Some(payment_id))
            .correlated(gateway_id),
        )
        .await?;
        tx.commit().await?;

        self.alerts
            .raise(
                Alert::new(
                    AlertType::DuplicatePaymentAttempt,
                    Severity::Medium,
                    "Duplicate payment notification",
                    format!("gateway payment {gateway_id} was already applied"),
                )
                .payment(payment_id)
                .source_ip(event.source_ip.clone())
                .data(json!({"event_id": event.id, "gateway_payment_id": gateway_id})),
            )
            .await;

        Ok(Outcome::Duplicate { payment_id })
    }

    async fn record_failure(&self, event: &WebhookEvent, failure: Failure) -> anyhow::Result<Outcome> {
        let transition = failure_transition(event.attempts, event.max_attempts);
        let message = failure.error.to_string();
        tracing::warn!(
            status = transition.status.as_str(),
            code = failure.error.code(),
            "webhook event attempt failed: {}",
            message
        );

        let mut tx = self.pool.begin().await?;
        if !WebhookEventsRepo::record_failure_tx(&mut tx, event.id, transition.status, &message, failure.payment_id)
            .await?
        {
            return Ok(abandon_lost_claim(tx, event.id).await?);
        }
        let mut entry = NewAuditEntry::new(
            failure.error.audit_action(),
            ACTOR,
            format!("event {} attempt {}/{} failed", event.id, event.attempts, event.max_attempts),
            json!({
                "event_id": event.id,
                "attempt": event.attempts,
                "max_attempts": event.max_attempts,
                "status": transition.status,
                "error_code": failure.error.code(),
                "error": message,
            }),
        )
        .for_payment(failure.payment_id);
        if let Some(gateway_id) = &event.gateway_payment_id {
            entry = entry.correlated(gateway_id.clone());
        }
        AuditRepo::append_tx(&mut tx, entry).await?;
        tx.commit().await?;

        if transition.exhausted {
            let mut alert = Alert::new(
                AlertType::WebhookProcessingFailed,
                Severity::High,
                "Webhook processing failed",
                format!("event {} exhausted {} attempts: {}", event.id, event.max_attempts, message),
            )
            .data(json!({"event_id": event.id, "topic": event.topic}));
            if let Some(payment_id) = failure.payment_id {
                alert = alert.payment(payment_id);
            }
            self.alerts.raise(alert).await;
        }

        Ok(Outcome::Failed(transition))
    }
}
