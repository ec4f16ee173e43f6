//! axum router and route handlers for the HTTP bridge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tracing::info;

use drawsync_config::ServerConfig;

use super::remote::RemoteEditor;
use super::types::*;
use crate::dispatch::{HistorySummary, ToolDispatcher, ToolReport};
use crate::llm::ToolCall;
use crate::loader::LoaderError;

/// Shared state accessible to all route handlers.
pub struct ServerState {
    pub dispatcher: Arc<ToolDispatcher>,
    pub editor: Arc<RemoteEditor>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl ServerState {
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        editor: Arc<RemoteEditor>,
        config: ServerConfig,
    ) -> Self {
        Self {
            dispatcher,
            editor,
            config,
            started_at: Instant::now(),
        }
    }

    fn poll_window(&self, params: &PollParams) -> Duration {
        let window = Duration::from_secs(self.config.command_poll_secs);
        params
            .wait_ms
            .map(Duration::from_millis)
            .map_or(window, |wait| wait.min(window))
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Build the axum router with all bridge routes.
pub fn router(state: Arc<ServerState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/tools", post(handle_tool_call))
        .route("/editor/commands", get(handle_next_command))
        .route("/editor/export", post(handle_export))
        .route("/history", get(handle_history))
        .route("/history/restore", post(handle_restore))
        .route("/history/clear", post(handle_clear))
        .with_state(state)
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let history = state.dispatcher.history_summary();
    Json(StatusResponse {
        running: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        editor_attached: state.editor.is_attached(),
        export_pending: state.dispatcher.export_pending(),
        history_len: history.len,
        history_cursor: history.cursor,
    })
}

async fn handle_tool_call(
    State(state): State<Arc<ServerState>>,
    Json(call): Json<ToolCall>,
) -> Json<ToolReport> {
    Json(state.dispatcher.dispatch(&call).await)
}

async fn handle_next_command(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<PollParams>,
) -> Response {
    match state.editor.next_command(state.poll_window(&params)).await {
        Some(command) => Json(command).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn handle_export(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ExportRequest>,
) -> Json<ExportResponse> {
    let awaited = state.editor.export_complete(req.ticket, req.document);
    Json(ExportResponse { awaited })
}

async fn handle_history(State(state): State<Arc<ServerState>>) -> Json<HistorySummary> {
    Json(state.dispatcher.history_summary())
}

async fn handle_restore(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<RestoreResponse>, ApiError> {
    match state.dispatcher.restore(req.position).await {
        Ok(snapshot) => {
            info!(position = req.position, "History restored via bridge");
            Ok(Json(RestoreResponse {
                position: req.position,
                document: snapshot.document().to_string(),
            }))
        }
        Err(err @ LoaderError::History(_)) => Err(api_error(StatusCode::NOT_FOUND, err)),
        Err(err @ LoaderError::Load(_)) => Err(api_error(StatusCode::CONFLICT, err)),
    }
}

async fn handle_clear(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<ClearResponse>, ApiError> {
    state
        .dispatcher
        .clear()
        .await
        .map_err(|err| api_error(StatusCode::CONFLICT, err))?;
    info!("History cleared via bridge");
    Ok(Json(ClearResponse { cleared: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_state() -> Arc<ServerState> {
        let editor = Arc::new(RemoteEditor::new());
        let dispatcher = Arc::new(ToolDispatcher::new(
            editor.clone(),
            Duration::from_millis(50),
        ));
        Arc::new(ServerState::new(dispatcher, editor, ServerConfig::default()))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: Response) -> T {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, value: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(test_state());
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let health: HealthResponse = body_json(resp).await;
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = router(test_state());
        let req = Request::get("/status").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let status: StatusResponse = body_json(resp).await;
        assert!(status.running);
        assert!(!status.editor_attached);
        assert_eq!(status.history_len, 0);
        assert_eq!(status.history_cursor, None);
    }

    #[tokio::test]
    async fn test_idle_poll_returns_no_content() {
        let app = router(test_state());
        let req = Request::get("/editor/commands?wait_ms=10")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_display_without_editor_is_reported() {
        let app = router(test_state());
        let req = post_json(
            "/tools",
            json!({ "id": "c1", "name": "display_diagram", "arguments": { "xml": "<mxGraphModel/>" } }),
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let report: ToolReport = body_json(resp).await;
        assert_eq!(report.call_id, "c1");
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_restore_out_of_range() {
        let app = router(test_state());
        let resp = app
            .oneshot(post_json("/history/restore", json!({ "position": 3 })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let err: ErrorResponse = body_json(resp).await;
        assert!(err.error.contains("out of range"));
    }

    #[tokio::test]
    async fn test_export_without_pending_request() {
        let app = router(test_state());
        let resp = app
            .oneshot(post_json(
                "/editor/export",
                json!({ "ticket": 1, "document": "<mxGraphModel/>" }),
            ))
            .await
            .unwrap();
        let ack: ExportResponse = body_json(resp).await;
        assert!(!ack.awaited);
    }

    #[test]
    fn test_poll_window_is_capped() {
        let state = test_state();
        let capped = state.poll_window(&PollParams {
            wait_ms: Some(600_000),
        });
        assert_eq!(capped, Duration::from_secs(25));
        assert_eq!(
            state.poll_window(&PollParams { wait_ms: Some(5) }),
            Duration::from_millis(5)
        );
        assert_eq!(state.poll_window(&PollParams::default()), Duration::from_secs(25));
    }
}
