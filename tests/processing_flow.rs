use payments_reconciler::alerts::AlertDispatcher;
use payments_reconciler::domain::payment::{Payment, PaymentStatus, RegisterPaymentRequest};
use payments_reconciler::domain::webhook_event::{EventStatus, WebhookEvent};
use payments_reconciler::downstream::{DownstreamSync, SettlementSync};
use payments_reconciler::error::SyncError;
use payments_reconciler::gateways::mock::MockGateway;
use payments_reconciler::gateways::GatewayPayment;
use payments_reconciler::intake::signature::SignatureState;
use payments_reconciler::repo::alerts_repo::AlertsRepo;
use payments_reconciler::repo::audit_repo::AuditRepo;
use payments_reconciler::repo::payments_repo::PaymentsRepo;
use payments_reconciler::repo::webhook_events_repo::WebhookEventsRepo;
use payments_reconciler::service::intake_service::build_event;
use payments_reconciler::service::webhook_processor::{Outcome, WebhookProcessor};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSync {
    synced: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl DownstreamSync for RecordingSync {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn sync_settlement(&self, request: &SettlementSync) -> Result<(), SyncError> {
        self.synced.lock().unwrap().push(request.gateway_payment_id.clone());
        Ok(())
    }
}

struct Harness {
    pool: PgPool,
    events: WebhookEventsRepo,
    payments: PaymentsRepo,
    gateway: Arc<MockGateway>,
    downstream: Arc<RecordingSync>,
    processor: WebhookProcessor,
}

fn harness(pool: PgPool) -> Harness {
    let gateway = Arc::new(MockGateway::new(""));
    let downstream = Arc::new(RecordingSync::default());
    let processor = WebhookProcessor {
        pool: pool.clone(),
        payments_repo: PaymentsRepo { pool: pool.clone() },
        gateway: gateway.clone(),
        downstream: downstream.clone(),
        alerts: AlertDispatcher {
            alerts_repo: AlertsRepo { pool: pool.clone() },
            sinks: Arc::new(Vec::new()),
        },
        amount_tolerance: Decimal::new(1, 2),
        gateway_timeout: Duration::from_secs(5),
        sync_timeout: Duration::from_secs(5),
    };
    Harness {
        events: WebhookEventsRepo { pool: pool.clone() },
        payments: PaymentsRepo { pool: pool.clone() },
        pool,
        gateway,
        downstream,
        processor,
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

impl Harness {
    async fn register(&self, expected: &str) -> Payment {
        let mut tx = self.pool.begin().await.unwrap();
        let payment = PaymentsRepo::insert_tx(
            &mut tx,
            &RegisterPaymentRequest {
                tenant_id: "tenant-1".to_string(),
                contact_ref: Some("contact-1".to_string()),
                expected_amount: dec(expected),
                currency: "ARS".to_string(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        payment
    }

    fn gateway_reports(&self, payment: &Payment, id: &str, status: &str, amount: Option<&str>) {
        self.gateway.insert(GatewayPayment {
            gateway_payment_id: id.to_string(),
            status: status.to_string(),
            settled_amount: amount.map(dec),
            correlation_token: Some(payment.correlation_token.clone()),
            payment_method: Some("visa".to_string()),
            status_detail: None,
        });
    }

    async fn deliver(&self, raw: &[u8]) -> i64 {
        let event = build_event(raw, json!({}), None, SignatureState::Unknown, 3);
        self.events.insert(&event).await.unwrap()
    }

    async fn deliver_notification(&self, gateway_id: &str) -> i64 {
        let raw = serde_json::to_vec(&json!({"type": "payment", "data": {"id": gateway_id}})).unwrap();
        self.deliver(&raw).await
    }

    async fn claim(&self) -> Vec<WebhookEvent> {
        self.events.claim_pending(50).await.unwrap()
    }

    async fn event(&self, id: i64) -> WebhookEvent {
        self.events.get(id).await.unwrap().unwrap()
    }
}

async fn audit_count(pool: &PgPool, action: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM audit_records WHERE action = $1")
        .bind(action)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn alert_count(pool: &PgPool, alert_type: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM security_alerts WHERE alert_type = $1")
        .bind(alert_type)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn matching_approval_settles_syncs_and_audits_once(pool: PgPool) {
    let h = harness(pool);
    let payment = h.register("100.00").await;
    h.gateway_reports(&payment, "U1", "approved", Some("100.00"));
    let event_id = h.deliver_notification("U1").await;

    let claimed = h.claim().await;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].attempts, 1);
    let outcome = h.processor.process(&claimed[0]).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Settled {
            payment_id: payment.id,
            status: PaymentStatus::Approved,
            downstream_synced: true,
        }
    );

    let stored = h.payments.get(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Approved);
    assert_eq!(stored.settled_amount, Some(dec("100.00")));
    assert_eq!(stored.gateway_payment_id.as_deref(), Some("U1"));
    assert!(stored.is_downstream_synced);
    assert_eq!(*h.downstream.synced.lock().unwrap(), vec!["U1".to_string()]);

    let event = h.event(event_id).await;
    assert_eq!(event.status, EventStatus::Processed);
    assert_eq!(event.last_error, None);
    assert_eq!(event.payment_id, Some(payment.id));
    assert_eq!(audit_count(&h.pool, "WEBHOOK_PROCESSED").await, 1);

    let chain = AuditRepo { pool: h.pool.clone() }.verify_chain(None, None).await.unwrap();
    assert!(chain.valid);
}

#[sqlx::test(migrations = "./migrations")]
async fn repeated_deliveries_settle_once(pool: PgPool) {
    let h = harness(pool);
    let payment = h.register("100.00").await;
    h.gateway_reports(&payment, "U1", "approved", Some("100.00"));
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(h.deliver_notification("U1").await);
    }

    let claimed = h.claim().await;
    assert_eq!(claimed.len(), 5);
    let mut settled = 0;
    let mut duplicates = 0;
    for event in &claimed {
        match h.processor.process(event).await.unwrap() {
            Outcome::Settled { .. } => settled += 1,
            Outcome::Duplicate { payment_id } => {
                assert_eq!(payment_id, payment.id);
                duplicates += 1;
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!((settled, duplicates), (1, 4));

    for id in &ids[1..] {
        let event = h.event(*id).await;
        assert_eq!(event.status, EventStatus::Processed);
        assert_eq!(event.annotation.as_deref(), Some("duplicate"));
    }
    let stored = h.payments.get(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.settlement_attempts, 1);
    assert_eq!(h.downstream.synced.lock().unwrap().len(), 1);
    assert_eq!(audit_count(&h.pool, "DUPLICATE_PAYMENT_ATTEMPT").await, 4);
}

#[sqlx::test(migrations = "./migrations")]
async fn amount_mismatch_fails_after_three_attempts_and_alerts_once(pool: PgPool) {
    let h = harness(pool);
    let payment = h.register("100.00").await;
    h.gateway_reports(&payment, "U2", "approved", Some("150.00"));
    let event_id = h.deliver_notification("U2").await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let claimed = h.claim().await;
        assert_eq!(claimed.len(), 1);
        h.processor.process(&claimed[0]).await.unwrap();
        let event = h.event(event_id).await;
        statuses.push((event.attempts, event.status));
        h.events.requeue_due(0, 0).await.unwrap();
    }
    assert_eq!(
        statuses,
        vec![
            (1, EventStatus::Error),
            (2, EventStatus::Error),
            (3, EventStatus::Failed),
        ]
    );
    assert!(h.claim().await.is_empty());

    let stored = h.payments.get(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(stored.gateway_payment_id, None);
    assert!(h.downstream.synced.lock().unwrap().is_empty());

    assert_eq!(audit_count(&h.pool, "AMOUNT_MISMATCH").await, 3);
    assert_eq!(alert_count(&h.pool, "AMOUNT_MISMATCH").await, 1);
    assert_eq!(alert_count(&h.pool, "WEBHOOK_PROCESSING_FAILED").await, 1);

    let (expected, actual): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT expected_value, actual_value FROM security_alerts WHERE alert_type = 'AMOUNT_MISMATCH'",
    )
    .fetch_one(&h.pool)
    .await
    .unwrap();
    assert_eq!(expected.as_deref(), Some("100.00"));
    assert_eq!(actual.as_deref(), Some("150.00"));
}

#[sqlx::test(migrations = "./migrations")]
async fn malformed_delivery_ends_failed_with_its_parse_error(pool: PgPool) {
    let h = harness(pool);
    let event_id = h.deliver(b"{not json").await;

    let stored = h.event(event_id).await;
    assert_eq!(stored.status, EventStatus::Error);
    assert_eq!(stored.attempts, 0);

    for _ in 0..4 {
        h.events.requeue_due(0, 0).await.unwrap();
        for event in h.claim().await {
            let outcome = h.processor.process(&event).await.unwrap();
            assert!(matches!(outcome, Outcome::Failed(_)), "unexpected outcome {outcome:?}");
        }
        assert_ne!(h.event(event_id).await.status, EventStatus::Processed);
    }

    let event = h.event(event_id).await;
    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(event.attempts, 3);
    let last_error = event.last_error.unwrap();
    assert!(last_error.starts_with("validation error: invalid JSON"), "{last_error}");
    assert_eq!(audit_count(&h.pool, "WEBHOOK_FAILED").await, 3);
    assert_eq!(alert_count(&h.pool, "WEBHOOK_PROCESSING_FAILED").await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn expired_claim_keeps_no_settlement(pool: PgPool) {
    let h = harness(pool);
    let payment = h.register("100.00").await;
    h.gateway_reports(&payment, "U3", "approved", Some("100.00"));
    let event_id = h.deliver_notification("U3").await;

    let claimed = h.claim().await;
    sqlx::query("UPDATE webhook_events SET last_attempt_at = now() - interval '1 hour' WHERE id = $1")
        .bind(event_id)
        .execute(&h.pool)
        .await
        .unwrap();
    let expired = h.events.expire_stale_claims(60).await.unwrap();
    assert_eq!(expired.len(), 1);

    let outcome = h.processor.process(&claimed[0]).await.unwrap();
    assert_eq!(outcome, Outcome::ClaimLost);

    let stored = h.payments.get(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(h.downstream.synced.lock().unwrap().is_empty());
    assert_eq!(audit_count(&h.pool, "WEBHOOK_PROCESSED").await, 0);
    let event = h.event(event_id).await;
    assert_eq!(event.status, EventStatus::Error);
    assert_eq!(event.last_error.as_deref(), Some("processing lease expired"));

    // The sweeper's retry then settles it normally.
    h.events.requeue_due(0, 0).await.unwrap();
    let retried = h.claim().await;
    assert!(matches!(
        h.processor.process(&retried[0]).await.unwrap(),
        Outcome::Settled { .. }
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn other_topics_are_acknowledged_without_audit(pool: PgPool) {
    let h = harness(pool);
    let event_id = h
        .deliver(br#"{"type": "merchant_order", "data": {"id": "M1"}}"#)
        .await;

    let claimed = h.claim().await;
    assert_eq!(h.processor.process(&claimed[0]).await.unwrap(), Outcome::IgnoredTopic);
    let event = h.event(event_id).await;
    assert_eq!(event.status, EventStatus::Processed);
    assert_eq!(event.annotation.as_deref(), Some("ignored_topic"));
    assert_eq!(h.gateway.calls(), 0);
    let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_records")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(records, 0);
}
