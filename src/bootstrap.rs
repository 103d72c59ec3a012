use crate::alerts::{build_sinks, AlertDispatcher};
use crate::config::AppConfig;
use crate::downstream::build_downstream;
use crate::gateways::build_gateway;
use crate::reconciliation::lease::RunLease;
use crate::reconciliation::settings::ReconciliationSettings;
use crate::repo::alerts_repo::AlertsRepo;
use crate::repo::audit_repo::AuditRepo;
use crate::repo::payments_repo::PaymentsRepo;
use crate::repo::reports_repo::ReportsRepo;
use crate::repo::webhook_events_repo::WebhookEventsRepo;
use crate::service::intake_service::IntakeService;
use crate::service::reconciliation_service::ReconciliationService;
use crate::service::webhook_processor::WebhookProcessor;
use crate::service::webhook_worker::{RetrySweeper, WebhookWorker};
use crate::AppState;
use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const RUN_LEASE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

pub async fn connect(cfg: &AppConfig, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&cfg.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Everything the binaries share, wired from one config.
#[derive(Clone)]
pub struct Components {
    pub pool: PgPool,
    pub redis_client: redis::Client,
    pub events_repo: WebhookEventsRepo,
    pub payments_repo: PaymentsRepo,
    pub audit_repo: AuditRepo,
    pub alerts_repo: AlertsRepo,
    pub reports_repo: ReportsRepo,
    pub alerts: AlertDispatcher,
    pub intake: IntakeService,
    pub processor: WebhookProcessor,
    pub reconciliation: ReconciliationService,
    pub recon_settings: ReconciliationSettings,
}

impl Components {
    pub fn build(cfg: &AppConfig, pool: PgPool) -> Result<Self> {
        let redis_client = redis::Client::open(cfg.redis_url.clone())?;

        let events_repo = WebhookEventsRepo { pool: pool.clone() };
        let payments_repo = PaymentsRepo { pool: pool.clone() };
        let audit_repo = AuditRepo { pool: pool.clone() };
        let alerts_repo = AlertsRepo { pool: pool.clone() };
        let reports_repo = ReportsRepo { pool: pool.clone() };

        let alerts = AlertDispatcher {
            alerts_repo: alerts_repo.clone(),
            sinks: Arc::new(build_sinks(cfg)),
        };
        let gateway = build_gateway(cfg);
        let downstream = build_downstream(cfg);
        tracing::info!(gateway = gateway.name(), downstream = downstream.name(), "collaborators configured");

        let intake = IntakeService {
            events_repo: events_repo.clone(),
            alerts: alerts.clone(),
            webhook_secret: cfg.webhook_secret.clone(),
            max_attempts: cfg.webhook_max_attempts,
        };

        let processor = WebhookProcessor {
            pool: pool.clone(),
            payments_repo: payments_repo.clone(),
            gateway: gateway.clone(),
            downstream: downstream.clone(),
            alerts: alerts.clone(),
            amount_tolerance: cfg.amount_tolerance,
            gateway_timeout: Duration::from_millis(cfg.gateway_timeout_ms),
            sync_timeout: Duration::from_millis(cfg.crm_timeout_ms),
        };

        let reconciliation = ReconciliationService {
            pool: pool.clone(),
            payments_repo: payments_repo.clone(),
            reports_repo: reports_repo.clone(),
            audit_repo: audit_repo.clone(),
            gateway,
            downstream,
            alerts: alerts.clone(),
            lease: Some(RunLease::new(redis_client.clone(), RUN_LEASE_TTL)),
            reports_dir: PathBuf::from(&cfg.reports_dir),
            running: Arc::new(Mutex::new(())),
        };

        Ok(Self {
            pool,
            redis_client,
            events_repo,
            payments_repo,
            audit_repo,
            alerts_repo,
            reports_repo,
            alerts,
            intake,
            processor,
            reconciliation,
            recon_settings: ReconciliationSettings::from_config(cfg),
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            pool: self.pool.clone(),
            redis_client: self.redis_client.clone(),
            intake: self.intake.clone(),
            events_repo: self.events_repo.clone(),
            payments_repo: self.payments_repo.clone(),
            audit_repo: self.audit_repo.clone(),
            alerts_repo: self.alerts_repo.clone(),
            reports_repo: self.reports_repo.clone(),
            alerts: self.alerts.clone(),
            reconciliation: self.reconciliation.clone(),
            recon_settings: self.recon_settings.clone(),
        }
    }

    pub fn workers(&self, cfg: &AppConfig) -> Vec<WebhookWorker> {
        (0..cfg.worker_concurrency.max(1))
            .map(|worker_id| WebhookWorker {
                worker_id,
                events_repo: self.events_repo.clone(),
                processor: self.processor.clone(),
                batch_size: cfg.worker_batch_size,
                poll_interval: Duration::from_millis(cfg.worker_poll_ms),
            })
            .collect()
    }

    pub fn sweeper(&self, cfg: &AppConfig) -> RetrySweeper {
        RetrySweeper {
            events_repo: self.events_repo.clone(),
            audit_repo: self.audit_repo.clone(),
            alerts: self.alerts.clone(),
            backoff_base_secs: cfg.retry_backoff_base_secs,
            backoff_cap_secs: cfg.retry_backoff_cap_secs,
            lease_secs: cfg.processing_lease_secs,
            interval: SWEEP_INTERVAL,
        }
    }
}
