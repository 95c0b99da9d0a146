use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::runtime::ContainerInventory;
use crate::session::SessionRegistry;

use super::api::{get_container_logs, get_runtime, health_check, list_containers, AppState};
use super::stream::stream_handler;

/// Build the application router. Split out from `run_server` so tests can
/// drive it without binding a socket.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/containers", get(list_containers))
        .route("/containers/runtime", get(get_runtime))
        .route("/containers/:id/logs", get(get_container_logs))
        .route("/ws", get(stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and serve until `shutdown_rx` flips to true
pub async fn run_server(
    registry: Arc<SessionRegistry>,
    inventory: Arc<dyn ContainerInventory>,
    server_config: ServerConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(&server_config.listen).await?;
    tracing::info!("Web server listening on {}", listener.local_addr()?);
    serve(listener, registry, inventory, shutdown_rx).await
}

/// Serve on an already-bound listener
pub async fn serve(
    listener: tokio::net::TcpListener,
    registry: Arc<SessionRegistry>,
    inventory: Arc<dyn ContainerInventory>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app_state = AppState {
        registry: registry.clone(),
        inventory,
        shutdown: shutdown_rx.clone(),
    };

    let app = build_router(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            tracing::info!("Web server shutting down gracefully");
        })
        .await?;

    registry.shutdown();
    Ok(())
}
