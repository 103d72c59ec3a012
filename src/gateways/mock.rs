use crate::error::GatewayError;
use crate::gateways::{GatewayPayment, PaymentGateway};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

/// In-memory gateway. `behavior` selects a failure mode:
/// `ALWAYS_UNREACHABLE`, `FLAKY_<n>` (first n calls unreachable), or
/// anything else to answer from the seeded payments.
pub struct MockGateway {
    pub behavior: String,
    payments: RwLock<HashMap<String, GatewayPayment>>,
    calls: AtomicU32,
}

impl MockGateway {
    pub fn new(behavior: impl Into<String>) -> Self {
        Self {
            behavior: behavior.into(),
            payments: RwLock::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_payment(self, payment: GatewayPayment) -> Self {
        self.insert(payment);
        self
    }

    pub fn insert(&self, payment: GatewayPayment) {
        if let Ok(mut payments) = self.payments.write() {
            payments.insert(payment.gateway_payment_id.clone(), payment);
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self.behavior.as_str();
        if behavior == "ALWAYS_UNREACHABLE" {
            return Err(GatewayError::Unreachable("mock gateway unreachable".to_string()));
        }
        if let Some(n) = behavior.strip_prefix("FLAKY_").and_then(|n| n.parse::<u32>().ok()) {
            if call <= n {
                return Err(GatewayError::Unreachable(format!("mock gateway flake {call}/{n}")));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.check_reachable()?;
        let payments = self
            .payments
            .read()
            .map_err(|_| GatewayError::Unreachable("mock store poisoned".to_string()))?;
        payments
            .get(gateway_payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(gateway_payment_id.to_string()))
    }

    async fn find_by_correlation(
        &self,
        correlation_token: &str,
    ) -> Result<Option<GatewayPayment>, GatewayError> {
        self.check_reachable()?;
        let payments = self
            .payments
            .read()
            .map_err(|_| GatewayError::Unreachable("mock store poisoned".to_string()))?;
        Ok(payments
            .values()
            .find(|p| p.correlation_token.as_deref() == Some(correlation_token))
            .cloned())
    }
}
