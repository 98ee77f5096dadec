//! HTTP transport for the dispatcher.
//!
//! Method checks and JSON framing happen here; everything the dispatcher
//! returns as a business error is written back with `200 OK`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::tool::{ErrorInfo, Tool, ToolDefinition, ToolDispatcher, ToolInvocationRequest};

/// Header used to propagate correlation IDs.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: ToolDispatcher,
    pub config: EngineConfig,
}

impl AppState {
    pub fn new(dispatcher: ToolDispatcher, config: EngineConfig) -> Self {
        Self { dispatcher, config }
    }
}

type AppStateArc = Arc<AppState>;

/// Health-check body.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    env: String,
    version: String,
}

/// Builds the router with all routes mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/:name", get(get_tool))
        .route("/execute-tool", post(execute_tool))
        .with_state(Arc::new(state))
}

/// Serves the router on `addr` until Ctrl-C.
pub async fn run(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        env: state.config.env.clone(),
        version: state.dispatcher.engine_version().to_string(),
    })
}

async fn list_tools(State(state): State<AppStateArc>) -> Json<Vec<ToolDefinition>> {
    Json(state.dispatcher.registry().to_tool_definitions())
}

async fn get_tool(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
) -> Result<Json<ToolDefinition>, (StatusCode, String)> {
    state
        .dispatcher
        .registry()
        .get(&name)
        .map(|tool| Json(tool.to_definition()))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("tool not found: {name}")))
}

async fn execute_tool(State(state): State<AppStateArc>, headers: HeaderMap, body: Bytes) -> Response {
    let mut request: ToolInvocationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid JSON: {e}")).into_response(),
    };

    if request.tool_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "tool_name is required").into_response();
    }

    if request.correlation_id.is_empty() {
        request.correlation_id = headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
    }

    // the dispatcher cancels its upstream work if this future is dropped
    let mut response = match state.dispatcher.dispatch(&request).await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(e) => {
            error!(error = %e, correlation_id = %request.correlation_id, "ExecuteTool fault");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "error": {
                        "code": ErrorInfo::INTERNAL_ERROR,
                        "message": "internal server error",
                    },
                })),
            )
                .into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request.correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
