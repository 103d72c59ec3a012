use crate::alerts::AlertDispatcher;
use crate::domain::alert::{Alert, AlertType, Severity};
use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::domain::webhook_event::EventStatus;
use crate::repo::audit_repo::AuditRepo;
use crate::repo::webhook_events_repo::WebhookEventsRepo;
use crate::service::webhook_processor::WebhookProcessor;
use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;

/// One claim-and-process loop. Several run side by side; the claim keeps
/// them from sharing an event.
#[derive(Clone)]
pub struct WebhookWorker {
    pub worker_id: usize,
    pub events_repo: WebhookEventsRepo,
    pub processor: WebhookProcessor,
    pub batch_size: i64,
    pub poll_interval: Duration,
}

impl WebhookWorker {
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker_id = self.worker_id, "webhook worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let handled = match self.tick().await {
                Ok(n) => n,
                Err(err) => {
                    tracing::error!(worker_id = self.worker_id, "webhook worker error: {:#}", err);
                    0
                }
            };
            if handled == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        tracing::info!(worker_id = self.worker_id, "webhook worker stopped");
    }

    /// Claims one batch and processes it to completion.
    pub async fn tick(&self) -> Result<usize> {
        let batch = self.events_repo.claim_pending(self.batch_size).await?;
        for event in &batch {
            if let Err(err) = self.processor.process(event).await {
                tracing::error!(event_id = event.id, "could not record webhook outcome: {:#}", err);
            }
        }
        Ok(batch.len())
    }
}

/// Requeues `error` events once their backoff elapses and recovers claims
/// abandoned by a crashed worker.
#[derive(Clone)]
pub struct RetrySweeper {
    pub events_repo: WebhookEventsRepo,
    pub audit_repo: AuditRepo,
    pub alerts: AlertDispatcher,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub lease_secs: u64,
    pub interval: Duration,
}

impl RetrySweeper {
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) = self.sweep().await {
                tracing::error!("retry sweep error: {:#}", err);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    pub async fn sweep(&self) -> Result<()> {
        for claim in self.events_repo.expire_stale_claims(self.lease_secs).await? {
            tracing::warn!(
                event_id = claim.id,
                attempts = claim.attempts,
                status = claim.status.as_str(),
                "processing lease expired"
            );
            self.audit_repo
                .append(NewAuditEntry::new(
                    AuditAction::WebhookFailed,
                    "retry_sweeper",
                    format!("event {} processing lease expired", claim.id),
                    json!({
                        "event_id": claim.id,
                        "attempt": claim.attempts,
                        "status": claim.status,
                        "error": "processing lease expired",
                    }),
                ))
                .await?;
            if claim.status == EventStatus::Failed {
                self.alerts
                    .raise(
                        Alert::new(
                            AlertType::WebhookProcessingFailed,
                            Severity::High,
                            "Webhook processing failed",
                            format!("event {} exhausted its attempts after a lost claim", claim.id),
                        )
                        .data(json!({"event_id": claim.id, "attempts": claim.attempts})),
                    )
                    .await;
            }
        }

        let requeued = self
            .events_repo
            .requeue_due(self.backoff_base_secs, self.backoff_cap_secs)
            .await?;
        if requeued > 0 {
            tracing::info!(requeued, "requeued webhook events for retry");
        }
        Ok(())
    }
}
