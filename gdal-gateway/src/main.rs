use anyhow::Context;
use tracing::{error, info};

use gdal_gateway::api::ApiServer;
use gdal_gateway::config::GatewayConfig;
use gdal_gateway::logging::init_logging;
use gdal_gateway::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();

    // Keep the guard alive so buffered file output is flushed on exit.
    let (logging_config, _guard) =
        init_logging(config.log_dir.as_deref()).context("initializing logging")?;

    let container = ServiceContainer::new(&config).context("initializing services")?;
    container.initialize();
    logging_config.start_retention_cleanup(container.cancellation_token());

    let server = ApiServer::with_state(
        config.api.clone(),
        container.app_state(Some(logging_config)),
    );
    let server_token = server.cancel_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        server_token.cancel();
    });

    info!(
        store = %config.store_dir.display(),
        max_concurrent_jobs = config.executor.max_concurrent_jobs,
        "gdal-gateway starting"
    );

    let result = server.run().await;
    container.shutdown();
    result.context("running API server")?;

    info!("gdal-gateway stopped");
    Ok(())
}
