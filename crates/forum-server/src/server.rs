//! HTTP server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::router::create_router;
use crate::state::AppState;

fn build_app(state: Arc<AppState>) -> Router {
    create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

fn warn_if_open(state: &AppState) {
    if state.admin_token.is_none() {
        tracing::warn!("No admin_token configured, admin routes are unauthenticated");
    }
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    warn_if_open(&state);
    let state = Arc::new(state);
    let sync = state.spawn_integration_sync();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Forum extension server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    sync.abort();
    tracing::info!("Server stopped");
    Ok(())
}

/// Server running in a background task.
pub struct ForumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Arc<AppState>,
    addr: SocketAddr,
    sync: JoinHandle<()>,
}

impl ForumServer {
    /// Bind `addr` and serve in the background. Port 0 picks a free port.
    ///
    /// # Errors
    /// Returns error if the listener cannot be bound.
    pub async fn start(state: AppState, addr: SocketAddr) -> Result<Self> {
        warn_if_open(&state);
        let state = Arc::new(state);
        let sync = state.spawn_integration_sync();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;
        let router = build_app(Arc::clone(&state));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });

            if let Err(e) = server.await {
                tracing::error!("Server error: {}", e);
            }
        });

        tracing::info!("Forum extension server started on http://{}", actual_addr);

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            state,
            addr: actual_addr,
            sync,
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            self.sync.abort();
            tracing::info!("Server shutdown requested");
        }
    }
}

impl Drop for ForumServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[tokio::test]
    async fn test_server_start() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = ServerConfig::default();
        config.resolve_paths(temp.path());
        let state = AppState::new(&config).unwrap();

        let mut server = ForumServer::start(state, SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();

        assert_ne!(server.addr().port(), 0);
        assert!(server.url().starts_with("http://127.0.0.1:"));
        server.shutdown();
    }
}
