use crate::config::AppConfig;
use crate::domain::money::amount_from_json;
use crate::domain::payment::PaymentStatus;
use crate::error::GatewayError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod http;
pub mod mock;

/// The gateway's canonical view of a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub gateway_payment_id: String,
    pub status: String,
    pub settled_amount: Option<Decimal>,
    pub correlation_token: Option<String>,
    pub payment_method: Option<String>,
    pub status_detail: Option<String>,
}

impl GatewayPayment {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::parse(&self.status)
    }

    /// Maps the gateway's payment document into the normalized shape.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, GatewayError> {
        let gateway_payment_id = match value.get("id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(GatewayError::InvalidResponse("missing payment id".to_string())),
        };
        let status = value
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::InvalidResponse("missing payment status".to_string()))?
            .to_ascii_lowercase();
        let text = |field: &str| {
            value
                .get(field)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        };

        Ok(Self {
            gateway_payment_id,
            status,
            settled_amount: value.get("transaction_amount").and_then(amount_from_json),
            correlation_token: text("external_reference"),
            payment_method: text("payment_method_id"),
            status_detail: text("status_detail"),
        })
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayError>;

    /// Most recent gateway payment carrying `correlation_token` as its
    /// external reference, if the customer has paid at all.
    async fn find_by_correlation(
        &self,
        correlation_token: &str,
    ) -> Result<Option<GatewayPayment>, GatewayError>;
}

pub fn build_gateway(cfg: &AppConfig) -> Arc<dyn PaymentGateway> {
    match cfg.gateway_adapter.as_str() {
        "mock" => {
            tracing::warn!("using mock payment gateway adapter");
            Arc::new(mock::MockGateway::new(
                std::env::var("MOCK_GATEWAY_BEHAVIOR").unwrap_or_default(),
            ))
        }
        _ => Arc::new(http::HttpGateway {
            base_url: cfg.gateway_base_url.trim_end_matches('/').to_string(),
            access_token: cfg.gateway_access_token.clone(),
            timeout_ms: cfg.gateway_timeout_ms,
            client: reqwest::Client::new(),
        }),
    }
}
