use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use contail::runtime::{
    ContainerInventory, ContainerRuntime, ContainerSummary, HistoryQuery, LogSource, RuntimeError,
    TailHandle, TailRequest,
};
use contail::session::{filter_chunk, SessionRegistry};
use contail::web::{build_router, AppState};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tower::ServiceExt;

struct NoTails;

impl LogSource for NoTails {
    fn spawn_tail(&self, _request: &TailRequest) -> Result<TailHandle, RuntimeError> {
        Err(RuntimeError::Unavailable)
    }
}

/// Inventory backed by canned data, recording the last history query.
struct FakeInventory {
    runtime: Option<ContainerRuntime>,
    last_query: Mutex<Option<(String, HistoryQuery)>>,
}

impl FakeInventory {
    fn new(runtime: Option<ContainerRuntime>) -> Self {
        Self {
            runtime,
            last_query: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ContainerInventory for FakeInventory {
    fn runtime(&self) -> Option<ContainerRuntime> {
        self.runtime
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        if self.runtime.is_none() {
            return Err(RuntimeError::Unavailable);
        }
        Ok(vec![ContainerSummary {
            id: "3f2a9c1d".to_string(),
            name: "web".to_string(),
            image: "nginx:1.25".to_string(),
            status: "Up 2 hours".to_string(),
            state: "running".to_string(),
        }])
    }

    async fn fetch_logs(
        &self,
        container_id: &str,
        query: &HistoryQuery,
    ) -> Result<String, RuntimeError> {
        contail::runtime::validate_container_id(container_id)?;
        if container_id == "broken" {
            return Err(RuntimeError::CommandFailed {
                command: "docker logs broken".to_string(),
                stderr: "daemon hiccup".to_string(),
            });
        }
        *self.last_query.lock().unwrap() = Some((container_id.to_string(), query.clone()));
        let history = "GET / 200\nGET /missing 404\nPOST /login 200";
        Ok(filter_chunk(history, query.filter.as_deref()).unwrap_or_default())
    }
}

fn app(inventory: Arc<FakeInventory>) -> axum::Router {
    let registry = Arc::new(SessionRegistry::new(Arc::new(NoTails), 100));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    build_router(AppState {
        registry,
        inventory,
        shutdown: shutdown_rx,
    })
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(app(Arc::new(FakeInventory::new(None))), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_runtime_reports_detected_cli() {
    let inventory = Arc::new(FakeInventory::new(Some(ContainerRuntime::Podman)));
    let (status, body) = get(app(inventory), "/containers/runtime").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"runtime":"podman"}"#);
}

#[tokio::test]
async fn test_runtime_empty_when_none_detected() {
    let (_, body) = get(app(Arc::new(FakeInventory::new(None))), "/containers/runtime").await;
    assert_eq!(body, r#"{"runtime":""}"#);
}

#[tokio::test]
async fn test_list_containers() {
    let inventory = Arc::new(FakeInventory::new(Some(ContainerRuntime::Docker)));
    let (status, body) = get(app(inventory), "/containers").await;

    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        value,
        serde_json::json!([{
            "id": "3f2a9c1d",
            "name": "web",
            "image": "nginx:1.25",
            "status": "Up 2 hours",
            "state": "running"
        }])
    );
}

#[tokio::test]
async fn test_list_containers_without_runtime_is_unavailable() {
    let (status, body) = get(app(Arc::new(FakeInventory::new(None))), "/containers").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("\"error\""));
}

#[tokio::test]
async fn test_history_passes_query_and_filters() {
    let inventory = Arc::new(FakeInventory::new(Some(ContainerRuntime::Docker)));
    let (status, body) = get(
        app(inventory.clone()),
        "/containers/web/logs?filter=get&tail=50&since=2024-05-01T00:00:00Z",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "GET / 200\nGET /missing 404");

    let (id, query) = inventory.last_query.lock().unwrap().clone().unwrap();
    assert_eq!(id, "web");
    assert_eq!(query.tail, Some(50));
    assert_eq!(query.since.as_deref(), Some("2024-05-01T00:00:00Z"));
    assert_eq!(query.until, None);
}

#[tokio::test]
async fn test_history_with_no_matches_is_empty() {
    let inventory = Arc::new(FakeInventory::new(Some(ContainerRuntime::Docker)));
    let (status, body) = get(app(inventory), "/containers/web/logs?filter=delete").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "");
}

#[tokio::test]
async fn test_history_rejects_invalid_container_id() {
    let inventory = Arc::new(FakeInventory::new(Some(ContainerRuntime::Docker)));
    let (status, _) = get(app(inventory), "/containers/-rm/logs").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_command_failure_is_internal_error() {
    let inventory = Arc::new(FakeInventory::new(Some(ContainerRuntime::Docker)));
    let (status, body) = get(app(inventory), "/containers/broken/logs").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("daemon hiccup"));
}
