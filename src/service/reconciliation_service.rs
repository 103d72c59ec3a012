use crate::alerts::AlertDispatcher;
use crate::domain::alert::{Alert, AlertType, Severity};
use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::domain::discrepancy::{Correction, Discrepancy};
use crate::domain::payment::{Payment, PaymentStatus, SettlementUpdate};
use crate::downstream::{DownstreamSync, SettlementSync};
use crate::error::{GatewayError, SyncError};
use crate::gateways::{GatewayPayment, PaymentGateway};
use crate::reconciliation::classifier::{classify, gateway_unreachable, processing_error};
use crate::reconciliation::lease::RunLease;
use crate::reconciliation::report::{new_run_id, run_status, summarize, ReconciliationReport};
use crate::reconciliation::settings::ReconciliationSettings;
use crate::repo::audit_repo::AuditRepo;
use crate::repo::payments_repo::PaymentsRepo;
use crate::repo::reports_repo::ReportsRepo;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

const ACTOR: &str = "reconciler";

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("a reconciliation run is already in progress")]
    AlreadyRunning,

    #[error("reconciliation aborted: {0:#}")]
    Aborted(#[from] anyhow::Error),
}

/// What the gateway says about a payment after retries.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayLookup {
    Found(GatewayPayment),
    /// No gateway payment carries this correlation token yet.
    NotYetPaid,
    NotFound,
    Unreachable(String),
}

/// Looks a payment up by gateway id, or by correlation token while no
/// gateway id is bound. "Not found" answers are final; everything else is
/// retried up to `max_retries` times with a fixed delay.
pub async fn query_gateway(
    gateway: &dyn PaymentGateway,
    payment: &Payment,
    settings: &ReconciliationSettings,
) -> GatewayLookup {
    let attempts = settings.max_retries.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let call = async {
            match &payment.gateway_payment_id {
                Some(id) => gateway.get_payment(id).await.map(Some),
                None => gateway.find_by_correlation(&payment.correlation_token).await,
            }
        };
        let result = match tokio::time::timeout(settings.gateway_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Unreachable("gateway call timed out".to_string())),
        };

        match result {
            Ok(Some(found)) => return GatewayLookup::Found(found),
            Ok(None) => return GatewayLookup::NotYetPaid,
            Err(GatewayError::NotFound(_)) => return GatewayLookup::NotFound,
            Err(err) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    attempt,
                    max_retries = attempts,
                    "gateway query failed: {}",
                    err
                );
                last_error = err.to_string();
                if attempt < attempts {
                    tokio::time::sleep(settings.retry_delay()).await;
                }
            }
        }
    }

    GatewayLookup::Unreachable(last_error)
}

#[derive(Debug)]
enum CorrectionResult {
    Applied { downstream_error: Option<String> },
    Skipped(&'static str),
    SyncFailed(String),
}

#[derive(Clone)]
pub struct ReconciliationService {
    pub pool: PgPool,
    pub payments_repo: PaymentsRepo,
    pub reports_repo: ReportsRepo,
    pub audit_repo: AuditRepo,
    pub gateway: Arc<dyn PaymentGateway>,
    pub downstream: Arc<dyn DownstreamSync>,
    pub alerts: AlertDispatcher,
    pub lease: Option<RunLease>,
    pub reports_dir: PathBuf,
    pub running: Arc<Mutex<()>>,
}

impl ReconciliationService {
    /// One full pass over the lookback window. Cancellation is checked
    /// between batches; the report then covers what was checked.
    pub async fn run(
        &self,
        settings: ReconciliationSettings,
        cancel: watch::Receiver<bool>,
    ) -> Result<ReconciliationReport, ReconciliationError> {
        let _local = self
            .running
            .clone()
            .try_lock_owned()
            .map_err(|_| ReconciliationError::AlreadyRunning)?;

        let started_at = Utc::now();
        let run_id = new_run_id(started_at);

        let guard = match &self.lease {
            Some(lease) => match lease.acquire(&run_id).await {
                Ok(Some(guard)) => Some(guard),
                Ok(None) => return Err(ReconciliationError::AlreadyRunning),
                Err(err) => {
                    tracing::warn!(run_id = %run_id, "run lease unavailable, proceeding without it: {:#}", err);
                    None
                }
            },
            None => None,
        };

        let result = self.execute(&run_id, started_at, &settings, &cancel).await;

        if let (Some(lease), Some(guard)) = (&self.lease, guard) {
            if let Err(err) = lease.release(guard).await {
                tracing::warn!(run_id = %run_id, "failed to release run lease: {:#}", err);
            }
        }

        match result {
            Ok(report) => Ok(report),
            Err(err) => {
                tracing::error!(run_id = %run_id, "reconciliation run aborted: {:#}", err);
                self.alerts
                    .raise(
                        Alert::new(
                            AlertType::ReconciliationCriticalError,
                            Severity::Critical,
                            "Reconciliation run aborted",
                            format!("run {run_id} failed: {err:#}"),
                        )
                        .data(json!({"run_id": run_id})),
                    )
                    .await;
                Err(ReconciliationError::Aborted(err))
            }
        }
    }

    #[tracing::instrument(name = "reconciliation_run", skip_all, fields(run_id = %run_id, hours_back = settings.hours_back, dry_run = settings.dry_run))]
    async fn execute(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        settings: &ReconciliationSettings,
        cancel: &watch::Receiver<bool>,
    ) -> anyhow::Result<ReconciliationReport> {
        let payments = self.payments_repo.list_unconfirmed(settings.hours_back).await?;
        tracing::info!(candidates = payments.len(), "reconciliation started");

        let mut discrepancies = Vec::new();
        let mut checked = 0;
        let mut cancelled = false;

        for (index, batch) in payments.chunks(settings.batch_size.max(1)).enumerate() {
            if index > 0 {
                if *cancel.borrow() {
                    cancelled = true;
                    break;
                }
                tokio::time::sleep(settings.batch_pause()).await;
            }
            if *cancel.borrow() {
                cancelled = true;
                break;
            }
            for payment in batch {
                checked += 1;
                if let Some(found) = self.reconcile_payment(run_id, payment, settings).await {
                    discrepancies.push(found);
                }
            }
        }

        let completed_at = Utc::now();
        let summary = summarize(checked, &discrepancies);
        let report = ReconciliationReport {
            run_id: run_id.to_string(),
            status: run_status(&discrepancies),
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
            cancelled,
            settings: settings.clone(),
            summary,
            discrepancies,
        };

        self.audit_repo
            .append(
                NewAuditEntry::new(
                    AuditAction::ReconciliationCompleted,
                    ACTOR,
                    format!(
                        "run {} checked {} payments, found {} discrepancies",
                        run_id, report.summary.payments_checked, report.summary.total_discrepancies
                    ),
                    json!({
                        "run_id": run_id,
                        "status": report.status,
                        "cancelled": cancelled,
                        "dry_run": settings.dry_run,
                        "duration_ms": report.duration_ms,
                        "summary": report.summary,
                    }),
                )
                .correlated(run_id),
            )
            .await?;

        self.reports_repo.save(&report).await?;
        match report.write_files(&self.reports_dir).await {
            Ok((json_path, csv_path)) => tracing::info!(
                json = %json_path.display(),
                csv = %csv_path.display(),
                "reconciliation report written"
            ),
            Err(err) => tracing::warn!("failed to write report files: {:#}", err),
        }

        for d in report.discrepancies.iter().filter(|d| d.severity >= Severity::High) {
            self.alerts
                .raise(
                    Alert::new(
                        AlertType::ReconciliationDiscrepancy,
                        d.severity,
                        format!("Reconciliation: {}", d.kind.as_str()),
                        d.description.clone(),
                    )
                    .values(&d.expected_value, &d.actual_value)
                    .payment(d.payment_id)
                    .data(json!({
                        "run_id": run_id,
                        "discrepancy_type": d.kind,
                        "gateway_payment_id": d.gateway_payment_id,
                        "error": d.error_message,
                    })),
                )
                .await;
        }

        tracing::info!(
            status = report.status.as_str(),
            checked = report.summary.payments_checked,
            discrepancies = report.summary.total_discrepancies,
            corrections = report.summary.corrections_applied,
            cancelled,
            "reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_payment(
        &self,
        run_id: &str,
        payment: &Payment,
        settings: &ReconciliationSettings,
    ) -> Option<Discrepancy> {
        let details = match query_gateway(self.gateway.as_ref(), payment, settings).await {
            GatewayLookup::Found(details) => details,
            GatewayLookup::NotYetPaid => return None,
            GatewayLookup::NotFound => {
                tracing::warn!(
                    payment_id = %payment.id,
                    gateway_payment_id = ?payment.gateway_payment_id,
                    "payment unknown to gateway"
                );
                return None;
            }
            GatewayLookup::Unreachable(err) => return Some(gateway_unreachable(payment, &err)),
        };

        let mut found = classify(payment, &details, settings.amount_tolerance)?;
        if !found.auto_correctable || !settings.corrections_enabled() {
            return Some(found);
        }

        match self.apply_correction(run_id, payment, &details, &found, settings).await {
            Ok(CorrectionResult::Applied { downstream_error }) => {
                found.correction_applied = true;
                found.error_message = downstream_error;
            }
            Ok(CorrectionResult::Skipped(reason)) => {
                tracing::info!(payment_id = %payment.id, reason, "correction skipped");
            }
            Ok(CorrectionResult::SyncFailed(err)) => {
                found.error_message = Some(err);
            }
            Err(err) => {
                tracing::error!(payment_id = %payment.id, "correction failed: {:#}", err);
                return Some(processing_error(
                    payment,
                    Some(details.gateway_payment_id.clone()),
                    &format!("{err:#}"),
                ));
            }
        }
        Some(found)
    }

    async fn sync(&self, request: &SettlementSync, settings: &ReconciliationSettings) -> Result<(), SyncError> {
        match tokio::time::timeout(settings.sync_timeout(), self.downstream.sync_settlement(request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Unreachable("downstream call timed out".to_string())),
        }
    }

    /// One transaction per payment. The status compare-and-set lets a
    /// concurrent webhook write win.
    async fn apply_correction(
        &self,
        run_id: &str,
        payment: &Payment,
        details: &GatewayPayment,
        found: &Discrepancy,
        settings: &ReconciliationSettings,
    ) -> anyhow::Result<CorrectionResult> {
        let gateway_id = details.gateway_payment_id.as_str();
        let mut tx = self.pool.begin().await?;
        let Some(locked) = PaymentsRepo::lock_tx(&mut tx, payment.id).await? else {
            return Ok(CorrectionResult::Skipped("payment no longer exists"));
        };

        let mut downstream_error = None;
        let new_status = match found.correction() {
            Correction::ApplyApproval | Correction::ApplyRejection => {
                if !locked.status.is_unconfirmed() {
                    return Ok(CorrectionResult::Skipped("payment settled concurrently"));
                }
                if let Some(owner) = PaymentsRepo::gateway_id_taken_tx(&mut tx, gateway_id).await? {
                    if owner != locked.id {
                        return Ok(CorrectionResult::Skipped("gateway payment bound to another payment"));
                    }
                }
                let Some(status) = details.payment_status().filter(|s| s.is_terminal()) else {
                    return Ok(CorrectionResult::Skipped("gateway status is not final"));
                };
                let update = SettlementUpdate {
                    status,
                    settled_amount: details.settled_amount.filter(|_| status == PaymentStatus::Approved),
                    settlement_method: details.payment_method.clone(),
                    status_detail: details.status_detail.clone(),
                    gateway_payment_id: Some(gateway_id.to_string()),
                };
                if !PaymentsRepo::apply_settlement_tx(&mut tx, locked.id, locked.status, &update).await? {
                    return Ok(CorrectionResult::Skipped("payment settled concurrently"));
                }
                if status == PaymentStatus::Approved {
                    let amount = update.settled_amount.unwrap_or(locked.expected_amount);
                    match self.sync(&SettlementSync::for_payment(&locked, gateway_id, amount), settings).await {
                        Ok(()) => {
                            PaymentsRepo::mark_synced_tx(&mut tx, locked.id).await?;
                        }
                        Err(err) => downstream_error = Some(err.to_string()),
                    }
                }
                status
            }
            Correction::RetryDownstreamSync => {
                if locked.status != PaymentStatus::Approved || locked.is_downstream_synced {
                    return Ok(CorrectionResult::Skipped("payment no longer awaits sync"));
                }
                let amount = locked
                    .settled_amount
                    .or(details.settled_amount)
                    .unwrap_or(locked.expected_amount);
                if let Err(err) = self.sync(&SettlementSync::for_payment(&locked, gateway_id, amount), settings).await {
                    return Ok(CorrectionResult::SyncFailed(err.to_string()));
                }
                PaymentsRepo::mark_synced_tx(&mut tx, locked.id).await?;
                locked.status
            }
            Correction::None => return Ok(CorrectionResult::Skipped("not correctable")),
        };

        AuditRepo::append_tx(
            &mut tx,
            NewAuditEntry::new(
                AuditAction::ReconciliationCorrection,
                ACTOR,
                format!("{} corrected: {} -> {}", found.kind.as_str(), locked.status, new_status),
                json!({
                    "run_id": run_id,
                    "discrepancy_type": found.kind,
                    "gateway_payment_id": gateway_id,
                    "previous_status": locked.status,
                    "status": new_status,
                    "downstream_error": downstream_error,
                }),
            )
            .for_payment(Some(locked.id))
            .correlated(run_id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %locked.id,
            discrepancy_type = found.kind.as_str(),
            "correction applied"
        );
        Ok(CorrectionResult::Applied { downstream_error })
    }
}
