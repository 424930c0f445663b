//! Server startup helper for embedding in the engine binary.
//!
//! [`spawn_server`] binds eagerly, so a busy port is reported to the
//! caller instead of being logged from a background task, then serves on
//! a spawned Tokio task.

use std::net::SocketAddr;
use std::sync::Arc;

use clocksignal_core::config::ServerConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::server::{self, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A server running on a background task.
#[derive(Debug)]
pub struct ServerHandle {
    /// The bound address. Differs from the configured one when port 0
    /// was requested.
    pub addr: SocketAddr,
    /// The serving task. Completes after the shutdown token fires.
    pub task: JoinHandle<()>,
}

/// Bind `config` and serve on a background task until `shutdown` fires.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the server cannot bind to the
/// requested address.
pub async fn spawn_server(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<ServerHandle, StartupError> {
    let listener = server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let task = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Server exited with error");
        }
    });

    tracing::info!(%addr, "Server spawned on background task");

    Ok(ServerHandle { addr, task })
}
