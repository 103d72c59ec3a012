use crate::config::AppConfig;
use crate::domain::payment::Payment;
use crate::error::SyncError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

pub mod crm;

#[derive(Debug, Clone, Serialize)]
pub struct SettlementSync {
    pub tenant_id: String,
    pub contact_ref: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub gateway_payment_id: String,
}

impl SettlementSync {
    pub fn for_payment(payment: &Payment, gateway_payment_id: &str, amount: Decimal) -> Self {
        Self {
            tenant_id: payment.tenant_id.clone(),
            contact_ref: payment.contact_ref.clone(),
            amount,
            currency: payment.currency.clone(),
            gateway_payment_id: gateway_payment_id.to_string(),
        }
    }
}

/// Pushes a confirmed settlement to the downstream system of record.
/// Implementations must be idempotent on `gateway_payment_id`.
#[async_trait::async_trait]
pub trait DownstreamSync: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sync_settlement(&self, request: &SettlementSync) -> Result<(), SyncError>;
}

pub struct NoopSync;

#[async_trait::async_trait]
impl DownstreamSync for NoopSync {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn sync_settlement(&self, request: &SettlementSync) -> Result<(), SyncError> {
        tracing::debug!(
            gateway_payment_id = %request.gateway_payment_id,
            "no downstream configured, settlement sync skipped"
        );
        Ok(())
    }
}

pub fn build_downstream(cfg: &AppConfig) -> Arc<dyn DownstreamSync> {
    match cfg.crm_base_url.as_deref().filter(|u| !u.is_empty()) {
        Some(base_url) => Arc::new(crm::CrmSync {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: cfg.crm_api_key.clone(),
            timeout_ms: cfg.crm_timeout_ms,
            client: reqwest::Client::new(),
        }),
        None => Arc::new(NoopSync),
    }
}
