use crate::client::MaxLogsError;
use crate::config::{load_or_default, Config, ConfigError};
use crate::runtime::{detect_runtime, CliRuntime, ContainerInventory, LogSource};
use crate::session::SessionRegistry;
use crate::web::run_server;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid max logs: {0}")]
    MaxLogs(#[from] MaxLogsError),

    #[error("web server error: {0}")]
    WebServer(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config = load_or_default(config_path.as_deref())?;
    serve(config).await
}

/// Run the server until Ctrl+C, then shut down and terminate every tail.
pub async fn serve(config: Config) -> Result<(), RunError> {
    let runtime = detect_runtime(config.runtime.prefer).await;
    match runtime {
        Some(runtime) => info!(runtime = %runtime, "Using container runtime"),
        None => warn!("No container runtime found, log streams will report errors"),
    }

    let cli_runtime = Arc::new(CliRuntime::new(runtime));
    let source: Arc<dyn LogSource> = cli_runtime.clone();
    let inventory: Arc<dyn ContainerInventory> = cli_runtime;
    let registry = Arc::new(SessionRegistry::new(source, config.stream.default_tail));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!("Starting web server on {}", config.server.listen);
    let mut web_handle = tokio::spawn(run_server(
        registry.clone(),
        inventory,
        config.server.clone(),
        shutdown_rx,
    ));

    info!("Server started, press Ctrl+C to shutdown");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
        result = &mut web_handle => {
            // Server exited on its own, e.g. the listen address was taken
            result??;
            return Ok(());
        }
    }

    web_handle.await??;
    info!(
        active_tails = registry.active_tails(),
        "Shutdown complete"
    );
    Ok(())
}
