use crate::config::AppConfig;
use crate::domain::alert::{Alert, Severity};
use crate::repo::alerts_repo::AlertsRepo;
use anyhow::Result;
use std::sync::Arc;

pub mod webhook_sink;

#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, alert: &Alert) -> Result<()>;
}

pub struct LogSink;

#[async_trait::async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            Severity::Critical | Severity::High => tracing::error!(
                alert_type = alert.alert_type.as_str(),
                severity = alert.severity.as_str(),
                payment_id = ?alert.payment_id,
                "{}: {}",
                alert.title,
                alert.message
            ),
            Severity::Medium | Severity::Low => tracing::warn!(
                alert_type = alert.alert_type.as_str(),
                severity = alert.severity.as_str(),
                payment_id = ?alert.payment_id,
                "{}: {}",
                alert.title,
                alert.message
            ),
        }
        Ok(())
    }
}

/// Delivers `alert` to every sink, logging failures. Never fails itself.
pub async fn notify_all(sinks: &[Arc<dyn AlertSink>], alert: &Alert) -> usize {
    let mut delivered = 0;
    for sink in sinks {
        match sink.notify(alert).await {
            Ok(()) => delivered += 1,
            Err(err) => tracing::warn!(
                sink = sink.name(),
                alert_type = alert.alert_type.as_str(),
                "alert delivery failed: {:#}",
                err
            ),
        }
    }
    delivered
}

/// Records alerts durably, then notifies the sinks in the background.
#[derive(Clone)]
pub struct AlertDispatcher {
    pub alerts_repo: AlertsRepo,
    pub sinks: Arc<Vec<Arc<dyn AlertSink>>>,
}

impl AlertDispatcher {
    pub async fn raise(&self, alert: Alert) {
        if let Err(err) = self.alerts_repo.insert(&alert).await {
            tracing::error!(
                alert_type = alert.alert_type.as_str(),
                "failed to persist alert: {:#}",
                err
            );
        }

        let sinks = self.sinks.clone();
        tokio::spawn(async move {
            notify_all(&sinks, &alert).await;
        });
    }

    /// Like `raise`, but skipped while an unresolved alert of the same type
    /// is open for this webhook event. Retries of one event alert once.
    pub async fn raise_once_per_event(&self, alert: Alert, event_id: i64) {
        match self.alerts_repo.has_open_for_event(alert.alert_type, event_id).await {
            Ok(true) => {
                tracing::debug!(
                    event_id,
                    alert_type = alert.alert_type.as_str(),
                    "alert already open for event"
                );
                return;
            }
            Ok(false) => {}
            Err(err) => tracing::warn!(event_id, "alert lookup failed, raising anyway: {:#}", err),
        }
        self.raise(alert).await;
    }
}

pub fn build_sinks(cfg: &AppConfig) -> Vec<Arc<dyn AlertSink>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];
    if let Some(url) = &cfg.alert_webhook_url {
        sinks.push(Arc::new(webhook_sink::WebhookAlertSink {
            target_url: url.clone(),
            secret: cfg.alert_webhook_secret.clone(),
            client: reqwest::Client::new(),
        }));
    }
    sinks
}
