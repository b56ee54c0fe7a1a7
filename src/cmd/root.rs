//! Main orchestrator command - starts the daemon server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Configuration;
use crate::container_host::DockerContainerHost;
use crate::mission::ProcessManager;
use crate::router::{self, AppState};
use crate::state_store::SqliteStateStore;

/// Run the orchestrator daemon.
pub async fn run(config_path: &str) -> Result<()> {
    info!("loading configuration from: {}", config_path);
    let config = Configuration::load(config_path)?;
    let config = Arc::new(config);

    info!(host = %config.api.host, port = config.api.port, "configuration loaded");

    let host: Arc<dyn crate::container_host::ContainerHost> =
        Arc::new(DockerContainerHost::connect(&config.docker)?);

    let store: Arc<dyn crate::state_store::StateStore> =
        Arc::new(SqliteStateStore::open(config.system.database_path())?);

    let manager = ProcessManager::new(config.clone(), host, store).await?;

    let state = AppState { manager: manager.clone() };
    let app = router::build_router(state);

    let bind_addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .expect("invalid bind address");

    info!(addr = %bind_addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    let shutdown_manager = manager.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install CTRL+C handler");
                return;
            }
            warn!("received shutdown signal, stopping monitor loop");
            shutdown_manager.shutdown();
        })
        .await?;

    info!("orchestrator stopped");
    Ok(())
}
