use crate::error::GatewayError;
use crate::gateways::{GatewayPayment, PaymentGateway};
use reqwest::StatusCode;

pub struct HttpGateway {
    pub base_url: String,
    pub access_token: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl HttpGateway {
    async fn get_json(&self, url: &str, subject: &str) -> Result<serde_json::Value, GatewayError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => r
                .json::<serde_json::Value>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string())),
            Ok(r) if r.status() == StatusCode::NOT_FOUND => Err(GatewayError::NotFound(subject.to_string())),
            Ok(r) => {
                let status = r.status();
                let body: String = r.text().await.unwrap_or_default().chars().take(200).collect();
                Err(classify_status(status, body))
            }
            Err(e) if e.is_timeout() => Err(GatewayError::Unreachable("gateway timeout".to_string())),
            Err(e) => Err(GatewayError::Unreachable(e.to_string())),
        }
    }
}

pub fn classify_status(status: StatusCode, body: String) -> GatewayError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        GatewayError::Unreachable(format!("HTTP_{}: {}", status.as_u16(), body))
    } else {
        GatewayError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

/// Picks the newest entry of a search response (`{"results": [...]}`).
pub fn latest_search_result(body: &serde_json::Value) -> Result<Option<GatewayPayment>, GatewayError> {
    let Some(results) = body.get("results").and_then(|r| r.as_array()) else {
        return Err(GatewayError::InvalidResponse("search response without results".to_string()));
    };
    let newest = results.iter().max_by(|a, b| {
        let a = a.get("date_created").and_then(|d| d.as_str()).unwrap_or("");
        let b = b.get("date_created").and_then(|d| d.as_str()).unwrap_or("");
        a.cmp(b)
    });
    newest.map(GatewayPayment::from_json).transpose()
}

#[async_trait::async_trait]
impl PaymentGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let url = format!("{}/v1/payments/{}", self.base_url, gateway_payment_id);
        let body = self.get_json(&url, gateway_payment_id).await?;
        GatewayPayment::from_json(&body)
    }

    async fn find_by_correlation(
        &self,
        correlation_token: &str,
    ) -> Result<Option<GatewayPayment>, GatewayError> {
        let url = format!("{}/v1/payments/search", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[
                ("external_reference", correlation_token),
                ("sort", "date_created"),
                ("criteria", "desc"),
            ])
            .bearer_auth(&self.access_token)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        let body = match resp {
            Ok(r) if r.status().is_success() => r
                .json::<serde_json::Value>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?,
            Ok(r) if r.status() == StatusCode::NOT_FOUND => return Ok(None),
            Ok(r) => {
                let status = r.status();
                let body: String = r.text().await.unwrap_or_default().chars().take(200).collect();
                return Err(classify_status(status, body));
            }
            Err(e) if e.is_timeout() => {
                return Err(GatewayError::Unreachable("gateway timeout".to_string()))
            }
            Err(e) => return Err(GatewayError::Unreachable(e.to_string())),
        };

        latest_search_result(&body)
    }
}
