use anyhow::Result;
use payments_reconciler::bootstrap::{connect, Components};
use payments_reconciler::config::AppConfig;
use payments_reconciler::service::reconciliation_service::ReconciliationError;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Scheduled reconciliation. `--once` runs a single pass and exits with the
/// run's outcome.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let once = std::env::args().any(|a| a == "--once");
    let cfg = AppConfig::from_env();
    let pool = connect(&cfg, 5).await?;
    let components = Components::build(&cfg, pool)?;
    let service = components.reconciliation.clone();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("cancellation requested, stopping after the current batch");
            let _ = cancel_tx.send(true);
        }
    });

    let interval = Duration::from_secs(cfg.recon_interval_secs.max(60));
    loop {
        match service.run(components.recon_settings.clone(), cancel_rx.clone()).await {
            Ok(report) => tracing::info!(
                run_id = %report.run_id,
                status = report.status.as_str(),
                discrepancies = report.summary.total_discrepancies,
                "reconciliation run complete"
            ),
            Err(ReconciliationError::AlreadyRunning) => {
                tracing::warn!("another reconciler holds the lease, skipping this run")
            }
            Err(err) if once => return Err(err.into()),
            Err(err) => tracing::error!("{}", err),
        }

        if once || *cancel_rx.borrow() {
            break;
        }
        let mut cancel = cancel_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.changed() => break,
        }
    }
    Ok(())
}
