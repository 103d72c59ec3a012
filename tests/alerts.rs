use anyhow::{anyhow, Result};
use payments_reconciler::alerts::{notify_all, AlertSink};
use payments_reconciler::domain::alert::{Alert, AlertType, Severity};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<(String, Severity)>>,
}

#[async_trait::async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push((alert.alert_type.as_str().to_string(), alert.severity));
        Ok(())
    }
}

struct FailingSink;

#[async_trait::async_trait]
impl AlertSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn notify(&self, _alert: &Alert) -> Result<()> {
        Err(anyhow!("connection refused"))
    }
}

fn mismatch_alert() -> Alert {
    Alert::new(
        AlertType::AmountMismatch,
        Severity::Critical,
        "Amount mismatch",
        "gateway approved 150.00, expected 100.00",
    )
    .values("100.00", "150.00")
    .payment(Uuid::new_v4())
}

#[tokio::test]
async fn every_sink_sees_the_alert() {
    let first = Arc::new(RecordingSink::default());
    let second = Arc::new(RecordingSink::default());
    let sinks: Vec<Arc<dyn AlertSink>> = vec![first.clone(), second.clone()];

    let delivered = notify_all(&sinks, &mismatch_alert()).await;
    assert_eq!(delivered, 2);
    for sink in [&first, &second] {
        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("AMOUNT_MISMATCH".to_string(), Severity::Critical)]);
    }
}

#[tokio::test]
async fn a_failing_sink_does_not_block_the_others() {
    let recorder = Arc::new(RecordingSink::default());
    let sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(FailingSink), recorder.clone()];

    let delivered = notify_all(&sinks, &mismatch_alert()).await;
    assert_eq!(delivered, 1);
    assert_eq!(recorder.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn no_sinks_is_fine() {
    assert_eq!(notify_all(&[], &mismatch_alert()).await, 0);
}

#[test]
fn builder_fills_context() {
    let payment_id = Uuid::new_v4();
    let alert = Alert::new(AlertType::InvalidWebhookSignature, Severity::High, "t", "m")
        .values("valid", "invalid")
        .payment(payment_id)
        .source_ip(Some("10.1.2.3".into()));
    assert_eq!(alert.expected_value.as_deref(), Some("valid"));
    assert_eq!(alert.actual_value.as_deref(), Some("invalid"));
    assert_eq!(alert.payment_id, Some(payment_id));
    assert_eq!(alert.source_ip.as_deref(), Some("10.1.2.3"));
    assert!(Severity::Critical > Severity::High);
    assert_eq!(Severity::parse("MEDIUM"), Some(Severity::Medium));
}
