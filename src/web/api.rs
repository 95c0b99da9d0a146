use crate::runtime::{ContainerInventory, ContainerSummary, HistoryQuery, RuntimeError};
use crate::session::SessionRegistry;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared state for the HTTP and streaming handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub inventory: Arc<dyn ContainerInventory>,
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Serialize)]
pub struct RuntimeResponse {
    pub runtime: String,
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /containers
pub async fn list_containers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContainerSummary>>, ApiError> {
    let containers = state.inventory.list_containers().await?;
    Ok(Json(containers))
}

/// GET /containers/runtime
pub async fn get_runtime(State(state): State<AppState>) -> Json<RuntimeResponse> {
    let runtime = state
        .inventory
        .runtime()
        .map(|r| r.to_string())
        .unwrap_or_default();
    Json(RuntimeResponse { runtime })
}

/// GET /containers/:id/logs?since=&until=&filter=&tail=
pub async fn get_container_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<String, ApiError> {
    let logs = state.inventory.fetch_logs(&id, &query).await?;
    Ok(logs)
}

// Error handling
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    ServiceUnavailable(String),
    InternalError(String),
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::InvalidContainerId(_) => ApiError::BadRequest(err.to_string()),
            RuntimeError::Unavailable => ApiError::ServiceUnavailable(err.to_string()),
            other => {
                tracing::error!(error = %other, "Runtime command failed");
                ApiError::InternalError(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
