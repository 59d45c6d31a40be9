//! HTTP request handlers

use crate::api::AppContext;
use crate::backend::PlayerStatus;
use crate::session::SessionSnapshot;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Upper bound for the backend status query behind `GET /status`
const STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Request/Response Types
// ============================================================================

/// Tag id as sent by readers: a string, or a bare JSON number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TagId {
    Text(String),
    Number(serde_json::Number),
}

impl TagId {
    fn into_string(self) -> String {
        match self {
            TagId::Text(s) => s.trim().to_string(),
            TagId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub id: TagId,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    accepted: bool,
    started: bool,
    reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    session: SessionSnapshot,
    backend: Option<PlayerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(ErrorResponse {
            status: format!("error: {}", message.into()),
        }),
    )
}

// ============================================================================
// Scan Endpoint
// ============================================================================

/// POST /play - a reader scanned a tag
///
/// Any structurally valid request is answered 200; the arbitration outcome
/// is carried in `started`/`reason`. The body is parsed by hand so every
/// malformed payload maps to 400 regardless of content type.
pub async fn play(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> Result<Json<PlayResponse>, ApiError> {
    let request: PlayRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejecting malformed scan body: {}", e);
        api_error(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e))
    })?;

    let id = request.id.into_string();
    if id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "empty id"));
    }

    debug!("Scan received: {}", id);
    match ctx.controller.handle_scan(id).await {
        Ok(outcome) => Ok(Json(PlayResponse {
            accepted: true,
            started: outcome.started(),
            reason: outcome.reason(),
        })),
        Err(e) => {
            error!("Scan not handled: {}", e);
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

// ============================================================================
// Status Endpoints
// ============================================================================

/// GET /status - session snapshot plus backend status
pub async fn status(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    let session = ctx.controller.snapshot().await.map_err(|e| {
        error!("Snapshot failed: {}", e);
        api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    let (backend, backend_error) =
        match tokio::time::timeout(STATUS_QUERY_TIMEOUT, ctx.backend.status()).await {
            Ok(Ok(status)) => (Some(status), None),
            Ok(Err(e)) => (None, Some(e.to_string())),
            Err(_) => (None, Some("backend status timed out".to_string())),
        };

    Ok(Json(StatusResponse {
        session,
        backend,
        backend_error,
    }))
}

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "yoda-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /metrics - Prometheus exposition
pub async fn metrics(State(ctx): State<AppContext>) -> Response {
    match ctx.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, ctx.metrics.content_type())],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
