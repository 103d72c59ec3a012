use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use payments_reconciler::bootstrap::{connect, Components};
use payments_reconciler::config::AppConfig;
use payments_reconciler::http::handlers::{
    admin_events, alerts, audit, ops, payments, reconciliation, webhooks,
};
use payments_reconciler::http::middleware::{admin_auth, rate_limit};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = connect(&cfg, 10).await?;
    let components = Components::build(&cfg, pool)?;

    // The API process also drains the queue unless workers run separately.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if cfg.embedded_workers {
        for worker in components.workers(&cfg) {
            tokio::spawn(worker.run(shutdown_rx.clone()));
        }
        tokio::spawn(components.sweeper(&cfg).run(shutdown_rx.clone()));
    }

    let state = components.app_state();

    let admin_routes = Router::new()
        .route("/admin/payments", post(payments::register_payment))
        .route("/admin/payments/:id", get(payments::get_payment))
        .route("/admin/webhooks/events", get(admin_events::list_events))
        .route("/admin/webhooks/events/:id", get(admin_events::get_event))
        .route("/admin/webhooks/events/:id/retry", post(admin_events::retry_event))
        .route("/admin/webhooks/stats", get(admin_events::stats))
        .route("/admin/audit/verify", get(audit::verify_chain))
        .route("/admin/audit/blocks/:block", get(audit::get_block))
        .route("/admin/audit/stats", get(audit::stats))
        .route("/admin/reconciliation/run", post(reconciliation::run_now))
        .route("/admin/reconciliation/reports", get(reconciliation::list_reports))
        .route("/admin/reconciliation/reports/:run_id", get(reconciliation::get_report))
        .route("/admin/alerts", get(alerts::list_alerts))
        .route("/admin/alerts/:id/resolve", post(alerts::resolve_alert))
        .layer(from_fn_with_state(
            cfg.internal_api_key.clone(),
            admin_auth::require_internal_api_key,
        ))
        .layer(from_fn_with_state(
            rate_limit::RateLimitState {
                redis_client: components.redis_client.clone(),
                max_per_minute: cfg.admin_rate_limit_per_minute,
            },
            rate_limit::enforce,
        ));

    let app = Router::new()
        .route("/health", get(payments::health))
        .route("/webhooks/gateway", post(webhooks::receive_gateway_webhook))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .merge(admin_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;
    Ok(())
}
