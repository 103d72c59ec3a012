use anyhow::Result;
use payments_reconciler::bootstrap::{connect, Components};
use payments_reconciler::config::AppConfig;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = connect(&cfg, (cfg.worker_concurrency as u32 + 2).max(5)).await?;
    let components = Components::build(&cfg, pool)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();
    for worker in components.workers(&cfg) {
        handles.push(tokio::spawn(worker.run(shutdown_rx.clone())));
    }
    handles.push(tokio::spawn(components.sweeper(&cfg).run(shutdown_rx)));
    tracing::info!(workers = cfg.worker_concurrency, "webhook workers running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, finishing current batches");
    shutdown_tx.send(true)?;
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!("worker task panicked: {}", err);
        }
    }
    Ok(())
}
