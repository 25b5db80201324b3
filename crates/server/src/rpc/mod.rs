//! HTTP surface: the SSE stream, the ingest endpoint, the control plane,
//! and the health/readiness/metrics probes.

mod handlers;
mod routes;
mod server;
mod state;

pub use routes::create_router;
pub use server::{ApiServer, ApiServerConfig, ApiServerError, ApiServerHandle};
pub use state::AppState;
