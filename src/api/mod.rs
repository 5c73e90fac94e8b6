//! HTTP surface over the governed toolkit
//!
//! Every tool call answers `200` with a [`GovernedResponse`]; callers branch
//! on its `success` flag. Only transport-level problems use other statuses.

use crate::governor::GovernedResponse;
use crate::metrics::METRICS;
use crate::staging::CacheStats;
use crate::tools::Toolkit;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Header naming the logical session a call belongs to
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub toolkit: Arc<Toolkit>,
}

impl AppState {
    pub fn new(toolkit: Arc<Toolkit>) -> Self {
        Self { toolkit }
    }
}

/// Error body for non-tool endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// One entry of the tool listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub global_entries: usize,
}

/// Build the router with tracing and a body size limit
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/tools", get(list_tools))
        .route("/api/v1/tools/:name", post(call_tool))
        .route("/api/v1/sessions/:id", delete(end_session))
        .route("/api/v1/cache/stats", get(cache_stats))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// POST /api/v1/tools/:name
///
/// The body is the tool's argument object; an empty body means no arguments.
/// With an `x-session-id` header the call runs against that session's cache.
pub async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Json<GovernedResponse> {
    let args = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let response = match session {
        Some(id) => state.toolkit.execute_for_session(id, &name, args).await,
        None => state.toolkit.execute(&name, args).await,
    };
    Json(response)
}

/// GET /api/v1/tools
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    let governor = state.toolkit.governor();
    let tools = state
        .toolkit
        .describe()
        .into_iter()
        .map(|(name, description)| ToolInfo {
            name: name.to_string(),
            description: description.to_string(),
            max_tokens: governor.budget_for(name),
        })
        .collect();
    Json(tools)
}

/// DELETE /api/v1/sessions/:id
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    if state.toolkit.end_session(&id) {
        info!("Session {} ended over HTTP", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        warn!("End requested for unknown session {}", id);
        Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new("SESSION_NOT_FOUND", format!("No session '{}'", id))),
        ))
    }
}

/// GET /api/v1/cache/stats
///
/// Stats of the fallback cache, or of the session named by `x-session-id`.
pub async fn cache_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CacheStats>, (StatusCode, Json<ApiError>)> {
    match headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) => state
            .toolkit
            .sessions()
            .get(id)
            .map(|session| Json(session.cache().stats()))
            .ok_or_else(|| {
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiError::new("SESSION_NOT_FOUND", format!("No session '{}'", id))),
                )
            }),
        None => Ok(Json(state.toolkit.global_cache().stats())),
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.toolkit.sessions().len(),
        global_entries: state.toolkit.global_cache().len(),
    })
}

/// GET /metrics
pub async fn metrics() -> String {
    METRICS.export_prometheus()
}
