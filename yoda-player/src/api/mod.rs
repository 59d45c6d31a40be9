//! HTTP surface
//!
//! Thin layer over the session controller:
//!
//! - `POST /play` - scan trigger from the RFID reader
//! - `GET /status` - session snapshot plus backend status
//! - `GET /health`
//! - `GET /metrics` - Prometheus text format
//! - `GET /events` - Server-Sent Events stream of session transitions

pub mod handlers;
pub mod sse;

use crate::backend::BackendHandle;
use crate::error::{Error, Result};
use crate::metrics::PlaybackMetrics;
use crate::session::SessionController;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use yoda_common::EventBus;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: SessionController,
    /// Used for status queries only; start/stop go through the controller
    pub backend: BackendHandle,
    pub metrics: Arc<PlaybackMetrics>,
    pub events: EventBus,
    /// Cancelled once at shutdown; ends the server and every open SSE stream
    pub shutdown: CancellationToken,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/play", post(handlers::play))
        .route("/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Bind the listening socket
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Listening for scans on http://{}", addr);
    Ok(listener)
}

/// Serve until `ctx.shutdown` is cancelled
///
/// Cancelling the token also ends open `/events` streams, so the graceful
/// drain does not wait on subscribers that never disconnect.
pub async fn serve(listener: TcpListener, ctx: AppContext) -> Result<()> {
    let shutdown = ctx.shutdown.clone();

    axum::serve(listener, create_router(ctx))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))
}
