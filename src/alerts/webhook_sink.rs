use crate::alerts::AlertSink;
use crate::domain::alert::Alert;
use anyhow::{bail, Result};
use serde_json::json;

pub struct WebhookAlertSink {
    pub target_url: String,
    pub secret: Option<String>,
    pub client: reqwest::Client,
}

#[async_trait::async_trait]
impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let payload = json!({
            "alert_type": alert.alert_type,
            "severity": alert.severity,
            "title": alert.title,
            "message": alert.message,
            "expected_value": alert.expected_value,
            "actual_value": alert.actual_value,
            "payment_id": alert.payment_id,
            "data": alert.data,
        });

        let mut req = self
            .client
            .post(&self.target_url)
            .header("Content-Type", "application/json")
            .header("X-Alert-Type", alert.alert_type.as_str())
            .timeout(std::time::Duration::from_secs(5))
            .json(&payload);
        if let Some(secret) = &self.secret {
            req = req.header("X-Alert-Secret", secret);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            bail!("alert webhook answered {}", resp.status());
        }
        Ok(())
    }
}
