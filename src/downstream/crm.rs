use crate::downstream::{DownstreamSync, SettlementSync};
use crate::error::SyncError;
use serde_json::json;

pub struct CrmSync {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[async_trait::async_trait]
impl DownstreamSync for CrmSync {
    fn name(&self) -> &'static str {
        "crm"
    }

    async fn sync_settlement(&self, request: &SettlementSync) -> Result<(), SyncError> {
        let contact = request.contact_ref.as_deref().ok_or(SyncError::MissingContact)?;
        let url = format!(
            "{}/v1/tenants/{}/contacts/{}/settlements",
            self.base_url, request.tenant_id, contact
        );
        let body = json!({
            "amount": request.amount,
            "currency": request.currency,
            "gateway_payment_id": request.gateway_payment_id,
            "tag": "payment-settled",
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &request.gateway_payment_id)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => Ok(()),
            // 409: the settlement was already recorded under this idempotency key.
            Ok(r) if r.status() == reqwest::StatusCode::CONFLICT => Ok(()),
            Ok(r) if r.status().is_server_error() => Err(SyncError::Unreachable(format!(
                "HTTP_{}",
                r.status().as_u16()
            ))),
            Ok(r) => {
                let status = r.status().as_u16();
                let message = r.text().await.unwrap_or_default().chars().take(200).collect();
                Err(SyncError::Rejected { status, message })
            }
            Err(e) if e.is_timeout() => Err(SyncError::Unreachable("downstream timeout".to_string())),
            Err(e) => Err(SyncError::Unreachable(e.to_string())),
        }
    }
}
