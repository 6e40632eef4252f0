//! HTTP admin surface for forum extensions
//!
//! Serves the extension lifecycle, listing, and configuration operations
//! over axum, and hosts the offline admin commands behind the `forum`
//! binary.

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use server::ForumServer;
pub use state::AppState;
