//! `forum serve`

use std::net::SocketAddr;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::server;
use crate::state::AppState;

/// Serve until Ctrl-C.
pub fn run_serve(config: &ServerConfig, bind: Option<SocketAddr>) -> Result<()> {
    let addr = bind.unwrap_or(config.server.bind);
    let state = AppState::new(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(state, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    }))
}
