//! Run the scheduler service until interrupted.

use std::sync::Arc;

use fleetcheck_core::scheduler::JobScheduler;
use fleetcheck_core::storage::AppConfig;
use fleetcheck_core::transport::WebhookTransport;
use tracing_subscriber::EnvFilter;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    if config.transport.base_url.is_empty() {
        return Err("transport.base_url is required to serve (set FLEETCHECK_RELAY_URL)".into());
    }
    let transport = Arc::new(WebhookTransport::new(
        &config.transport.base_url,
        &config.transport.token,
        config.transport.timeout_secs,
    )?);
    let db = super::open_db(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let scheduler = JobScheduler::new(db, transport, config);
        scheduler.initialize()?;
        tracing::info!("fleetcheck service running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        scheduler.shutdown();
        tracing::info!("shutting down");
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
