//! API server lifecycle.

use super::routes::create_router;
use super::state::AppState;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Errors from the API server.
#[derive(Debug, Error)]
pub enum ApiServerError {
    #[error("failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8002)),
        }
    }
}

/// Handle for controlling a running API server.
pub struct ApiServerHandle {
    task: JoinHandle<()>,
    state: AppState,
    /// The address actually bound (useful with port 0).
    local_addr: SocketAddr,
}

impl ApiServerHandle {
    /// Mark the server as ready (for the readiness probe).
    pub fn set_ready(&self, ready: bool) {
        self.state.ready.store(ready, Ordering::SeqCst);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Abort the server.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the server to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// The monitor's HTTP server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the server and return a handle for control.
    pub async fn start(self) -> Result<ApiServerHandle, ApiServerError> {
        let state = self.state.clone();
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "API server listening");

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = ?e, "API server error");
            }
        });

        Ok(ApiServerHandle {
            task,
            state,
            local_addr,
        })
    }

    /// Start and serve until shutdown (convenience method).
    pub async fn serve(self) -> Result<(), ApiServerError> {
        let handle = self.start().await?;
        handle.set_ready(true);
        let _ = handle.join().await;
        Ok(())
    }
}
