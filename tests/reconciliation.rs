use chrono::{TimeZone, Utc};
use payments_reconciler::domain::alert::Severity;
use payments_reconciler::domain::discrepancy::{Correction, DiscrepancyKind};
use payments_reconciler::domain::money::DEFAULT_AMOUNT_TOLERANCE;
use payments_reconciler::domain::payment::{Payment, PaymentStatus};
use payments_reconciler::gateways::mock::MockGateway;
use payments_reconciler::gateways::GatewayPayment;
use payments_reconciler::reconciliation::classifier::{classify, gateway_unreachable};
use payments_reconciler::reconciliation::report::{
    new_run_id, run_status, summarize, ReconciliationReport, RunStatus, CSV_HEADERS,
};
use payments_reconciler::reconciliation::settings::{ReconciliationSettings, SettingsOverride};
use payments_reconciler::service::reconciliation_service::{query_gateway, GatewayLookup};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn payment(status: PaymentStatus, synced: bool, gateway_id: Option<&str>) -> Payment {
    let id = Uuid::new_v4();
    Payment {
        id,
        gateway_payment_id: gateway_id.map(str::to_string),
        correlation_token: id.to_string(),
        tenant_id: "tenant-7".to_string(),
        contact_ref: Some("contact-1".to_string()),
        expected_amount: dec("100.00"),
        currency: "ARS".to_string(),
        settled_amount: (status == PaymentStatus::Approved).then(|| dec("100.00")),
        status,
        settlement_method: None,
        status_detail: None,
        is_downstream_synced: synced,
        settlement_attempts: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        settled_at: None,
    }
}

fn at_gateway(p: &Payment, id: &str, status: &str, amount: Option<&str>) -> GatewayPayment {
    GatewayPayment {
        gateway_payment_id: id.to_string(),
        status: status.to_string(),
        settled_amount: amount.map(dec),
        correlation_token: Some(p.correlation_token.clone()),
        payment_method: Some("visa".to_string()),
        status_detail: None,
    }
}

fn fast_settings() -> ReconciliationSettings {
    ReconciliationSettings {
        max_retries: 3,
        retry_delay_ms: 0,
        gateway_timeout_ms: 1_000,
        ..ReconciliationSettings::default()
    }
}

#[test]
fn classification_table() {
    let cases = [
        (PaymentStatus::Pending, false, "approved", Some("100.00"), Some(DiscrepancyKind::StatusMismatchApproved)),
        (PaymentStatus::InProcess, false, "approved", Some("100.00"), Some(DiscrepancyKind::StatusMismatchApproved)),
        (PaymentStatus::Pending, false, "rejected", None, Some(DiscrepancyKind::StatusMismatchRejected)),
        (PaymentStatus::Pending, false, "cancelled", None, Some(DiscrepancyKind::StatusMismatchRejected)),
        (PaymentStatus::Approved, false, "approved", Some("100.00"), Some(DiscrepancyKind::DownstreamNotUpdated)),
        (PaymentStatus::Pending, false, "approved", Some("150.00"), Some(DiscrepancyKind::AmountMismatch)),
        (PaymentStatus::Approved, false, "approved", Some("150.00"), Some(DiscrepancyKind::AmountMismatch)),
        (PaymentStatus::Approved, true, "approved", Some("100.00"), None),
        (PaymentStatus::Pending, false, "pending", None, None),
        (PaymentStatus::Pending, false, "in_process", None, None),
        (PaymentStatus::Rejected, false, "rejected", None, None),
    ];

    for (status, synced, gw_status, amount, expected) in cases {
        let p = payment(status, synced, None);
        let g = at_gateway(&p, "G1", gw_status, amount);
        let got = classify(&p, &g, DEFAULT_AMOUNT_TOLERANCE).map(|d| d.kind);
        assert_eq!(got, expected, "internal={status} synced={synced} gateway={gw_status} amount={amount:?}");
    }
}

#[test]
fn amount_mismatch_wins_over_status_mismatch() {
    let p = payment(PaymentStatus::Pending, false, None);
    let g = at_gateway(&p, "G2", "approved", Some("150.00"));
    let d = classify(&p, &g, DEFAULT_AMOUNT_TOLERANCE).unwrap();
    assert_eq!(d.kind, DiscrepancyKind::AmountMismatch);
    assert_eq!(d.severity, Severity::High);
    assert!(!d.auto_correctable);
    assert_eq!(d.correction(), Correction::None);
    assert_eq!(d.expected_amount, Some(dec("100.00")));
    assert_eq!(d.actual_amount, Some(dec("150.00")));
}

#[test]
fn pending_then_rejected_is_a_low_correctable_mismatch() {
    let p = payment(PaymentStatus::Pending, false, Some("G3"));
    let g = at_gateway(&p, "G3", "rejected", None);
    let d = classify(&p, &g, DEFAULT_AMOUNT_TOLERANCE).unwrap();
    assert_eq!(d.kind, DiscrepancyKind::StatusMismatchRejected);
    assert_eq!(d.severity, Severity::Low);
    assert!(d.auto_correctable);
    assert_eq!(d.correction(), Correction::ApplyRejection);
    assert_eq!(d.expected_value, "rejected");
    assert_eq!(d.actual_value, "pending");
}

#[test]
fn corrected_payment_is_clean_on_the_next_run() {
    let mut p = payment(PaymentStatus::Pending, false, None);
    let g = at_gateway(&p, "G4", "approved", Some("100.00"));
    assert_eq!(
        classify(&p, &g, DEFAULT_AMOUNT_TOLERANCE).map(|d| d.kind),
        Some(DiscrepancyKind::StatusMismatchApproved)
    );

    p.status = PaymentStatus::Approved;
    p.gateway_payment_id = Some("G4".to_string());
    p.is_downstream_synced = true;
    assert_eq!(classify(&p, &g, DEFAULT_AMOUNT_TOLERANCE), None);
}

#[test]
fn failed_sync_leaves_a_downstream_discrepancy() {
    let mut p = payment(PaymentStatus::Pending, false, None);
    let g = at_gateway(&p, "G5", "approved", Some("100.00"));
    p.status = PaymentStatus::Approved;
    let d = classify(&p, &g, DEFAULT_AMOUNT_TOLERANCE).unwrap();
    assert_eq!(d.kind, DiscrepancyKind::DownstreamNotUpdated);
    assert_eq!(d.severity, Severity::Critical);
    assert_eq!(d.correction(), Correction::RetryDownstreamSync);
}

#[test]
fn policy_table_never_corrects_integrity_problems() {
    for kind in DiscrepancyKind::ALL {
        let policy = kind.policy();
        assert_eq!(policy.auto_correctable, policy.correction != Correction::None, "{kind:?}");
    }
    assert!(!DiscrepancyKind::AmountMismatch.policy().auto_correctable);
    assert!(!DiscrepancyKind::GatewayUnreachable.policy().auto_correctable);
    assert_eq!(DiscrepancyKind::GatewayUnreachable.policy().severity, Severity::High);
}

#[test]
fn summary_counts_and_run_status() {
    let a = payment(PaymentStatus::Pending, false, None);
    let b = payment(PaymentStatus::Pending, false, None);
    let c = payment(PaymentStatus::Approved, false, None);

    let mut rejected = classify(&a, &at_gateway(&a, "A", "rejected", None), DEFAULT_AMOUNT_TOLERANCE).unwrap();
    rejected.correction_applied = true;
    let approved = classify(&b, &at_gateway(&b, "B", "approved", Some("100.00")), DEFAULT_AMOUNT_TOLERANCE).unwrap();
    let unreachable = gateway_unreachable(&c, "gateway unreachable: timeout");

    let found = vec![rejected, approved];
    let summary = summarize(10, &found);
    assert_eq!(summary.payments_checked, 10);
    assert_eq!(summary.total_discrepancies, 2);
    assert_eq!(summary.corrections_applied, 1);
    assert_eq!(summary.auto_correction_rate, 50.0);
    assert_eq!(summary.severity_breakdown.get("LOW"), Some(&1));
    assert_eq!(summary.severity_breakdown.get("MEDIUM"), Some(&1));
    assert_eq!(summary.severity_breakdown.get("CRITICAL"), Some(&0));
    assert_eq!(summary.discrepancy_types.get("STATUS_MISMATCH_REJECTED"), Some(&1));
    assert_eq!(run_status(&found), RunStatus::Warning);

    let mut with_high = found.clone();
    with_high.push(unreachable);
    assert_eq!(run_status(&with_high), RunStatus::Error);
    assert_eq!(run_status(&[]), RunStatus::Success);

    let empty = summarize(3, &[]);
    assert_eq!(empty.auto_correction_rate, 0.0);
    assert_eq!(empty.severity_breakdown.len(), 4);
}

#[test]
fn csv_report_has_fixed_columns() {
    let p = payment(PaymentStatus::Pending, false, None);
    let mut d = classify(&p, &at_gateway(&p, "G6", "approved", Some("150.00")), DEFAULT_AMOUNT_TOLERANCE).unwrap();
    d.description = "approved 150.00, expected 100.00".to_string();

    let started_at = Utc.with_ymd_and_hms(2024, 2, 1, 3, 0, 0).unwrap();
    let report = ReconciliationReport {
        run_id: new_run_id(started_at),
        status: run_status(std::slice::from_ref(&d)),
        started_at,
        completed_at: started_at,
        duration_ms: 0,
        cancelled: false,
        settings: ReconciliationSettings::default(),
        summary: summarize(1, std::slice::from_ref(&d)),
        discrepancies: vec![d],
    };

    let csv = report.to_csv().unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(CSV_HEADERS.join(",").as_str()));
    let row = lines.next().unwrap();
    assert!(row.contains("AMOUNT_MISMATCH"));
    assert!(row.contains("\"approved 150.00, expected 100.00\""));
    assert!(row.contains(",HIGH,false,false,"));
    assert_eq!(lines.next(), None);

    let json = report.to_json().unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["discrepancies"][0]["kind"], "AMOUNT_MISMATCH");
    assert!(report.run_id.starts_with("recon_20240201_030000_"));
}

#[test]
fn overrides_apply_only_what_is_given() {
    let base = ReconciliationSettings::default();
    let o = SettingsOverride {
        hours_back: Some(48),
        dry_run: Some(true),
        auto_correct: None,
    };
    let s = base.clone().with_override(&o);
    assert_eq!(s.hours_back, 48);
    assert!(s.dry_run);
    assert!(s.auto_correct);
    assert!(!s.corrections_enabled());
    assert!(base.corrections_enabled());

    let ignored = base.with_override(&SettingsOverride {
        hours_back: Some(0),
        ..SettingsOverride::default()
    });
    assert_eq!(ignored.hours_back, 24);
}

#[tokio::test]
async fn flaky_gateway_is_retried() {
    let p = payment(PaymentStatus::Pending, false, Some("G7"));
    let gateway = MockGateway::new("FLAKY_2").with_payment(at_gateway(&p, "G7", "approved", Some("100.00")));

    let lookup = query_gateway(&gateway, &p, &fast_settings()).await;
    assert!(matches!(lookup, GatewayLookup::Found(ref g) if g.gateway_payment_id == "G7"));
    assert_eq!(gateway.calls(), 3);
}

#[tokio::test]
async fn persistent_outage_is_reported_after_max_retries() {
    let p = payment(PaymentStatus::Pending, false, Some("G8"));
    let gateway = MockGateway::new("ALWAYS_UNREACHABLE");

    let lookup = query_gateway(&gateway, &p, &fast_settings()).await;
    match lookup {
        GatewayLookup::Unreachable(err) => assert!(err.contains("unreachable")),
        other => panic!("unexpected lookup {other:?}"),
    }
    assert_eq!(gateway.calls(), 3);

    let d = gateway_unreachable(&p, "gateway unreachable");
    assert_eq!(d.kind, DiscrepancyKind::GatewayUnreachable);
    assert!(!d.auto_correctable);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let p = payment(PaymentStatus::Pending, false, Some("missing"));
    let gateway = MockGateway::new("");

    assert_eq!(query_gateway(&gateway, &p, &fast_settings()).await, GatewayLookup::NotFound);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn unbound_payment_is_found_by_correlation_token() {
    let paid = payment(PaymentStatus::Pending, false, None);
    let unpaid = payment(PaymentStatus::Pending, false, None);
    let gateway = MockGateway::new("").with_payment(at_gateway(&paid, "G9", "approved", Some("100.00")));

    match query_gateway(&gateway, &paid, &fast_settings()).await {
        GatewayLookup::Found(g) => assert_eq!(g.gateway_payment_id, "G9"),
        other => panic!("unexpected lookup {other:?}"),
    }
    assert_eq!(query_gateway(&gateway, &unpaid, &fast_settings()).await, GatewayLookup::NotYetPaid);
}
