//! Route configuration for the HTTP API.

use super::handlers::*;
use super::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};

/// Create the full router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & readiness probes (no prefix)
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        // Metrics (no prefix, for Prometheus scraping)
        .route("/metrics", get(metrics_handler))
        // Record ingest (producers POST NDJSON here)
        .route("/ingest", post(ingest_handler))
        // The event stream
        .route("/sse/events", get(sse_handler))
        // API v1 control surface
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

/// Create the `/api/v1` router.
fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/control/session", post(start_session_handler))
        .route("/control/replicas", put(set_replicas_handler))
        .route("/control/replay", delete(clear_replay_handler))
        .route(
            "/control/request",
            put(set_request_handler).get(get_request_handler),
        )
}
