//! Route definitions.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

use crate::{auth::auth_middleware, handlers, state::AppState};

/// Creates the router with all routes.
///
/// Everything except `/health` sits behind the admin token check.
pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        // Listing
        .route("/extension", get(handlers::extensions::list))
        .route("/extension/stats", get(handlers::extensions::stats))
        .route("/extension/config", get(handlers::extensions::raw_index))
        .route(
            "/extension/integrations",
            get(handlers::extensions::integrations),
        )
        .route("/extension/events", get(handlers::events::stream))
        // Lifecycle
        .route(
            "/extension/{id}/install",
            post(handlers::extensions::install),
        )
        .route(
            "/extension/{id}/uninstall",
            post(handlers::extensions::uninstall),
        )
        .route("/extension/{id}/enable", post(handlers::extensions::enable))
        .route(
            "/extension/{id}/disable",
            post(handlers::extensions::disable),
        )
        .route("/extension/{id}/reload", post(handlers::extensions::reload))
        .route(
            "/extension/{id}/activate",
            post(handlers::extensions::activate),
        )
        .route("/extension/{id}/toggle", post(handlers::extensions::toggle))
        // Configuration
        .route(
            "/extension/configs/{id}",
            get(handlers::configs::get_config).put(handlers::configs::put_config),
        )
        .route(
            "/extension/configs/{id}/reset",
            post(handlers::configs::reset_config),
        )
        .route(
            "/extension/configs/{id}/validate",
            post(handlers::configs::validate_config),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::system::health))
        .merge(admin)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}
