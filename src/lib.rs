pub mod bootstrap;
pub mod config;
pub mod error;
pub mod alerts;
pub mod audit {
    pub mod chain;
    pub mod masking;
    pub mod verifier;
}
pub mod domain {
    pub mod alert;
    pub mod audit;
    pub mod discrepancy;
    pub mod money;
    pub mod payment;
    pub mod webhook_event;
}
pub mod downstream;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod admin_events;
        pub mod alerts;
        pub mod audit;
        pub mod ops;
        pub mod payments;
        pub mod reconciliation;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
        pub mod rate_limit;
    }
    pub mod response;
}
pub mod intake {
    pub mod parser;
    pub mod signature;
}
pub mod reconciliation {
    pub mod classifier;
    pub mod lease;
    pub mod report;
    pub mod settings;
}
pub mod repo {
    pub mod alerts_repo;
    pub mod audit_repo;
    pub mod payments_repo;
    pub mod reports_repo;
    pub mod webhook_events_repo;
}
pub mod service {
    pub mod intake_service;
    pub mod reconciliation_service;
    pub mod settlement_guard;
    pub mod webhook_processor;
    pub mod webhook_worker;
}

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub redis_client: redis::Client,
    pub intake: service::intake_service::IntakeService,
    pub events_repo: repo::webhook_events_repo::WebhookEventsRepo,
    pub payments_repo: repo::payments_repo::PaymentsRepo,
    pub audit_repo: repo::audit_repo::AuditRepo,
    pub alerts_repo: repo::alerts_repo::AlertsRepo,
    pub reports_repo: repo::reports_repo::ReportsRepo,
    pub alerts: alerts::AlertDispatcher,
    pub reconciliation: service::reconciliation_service::ReconciliationService,
    pub recon_settings: reconciliation::settings::ReconciliationSettings,
}
