//! Extension listing and lifecycle transitions.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use forum_extensions::{
    ExtensionManifest, ExtensionStats, LifecycleManager, RegistryEntry, RegistrySnapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ApiResponse, ApiResult};
use crate::auth::request_user;
use crate::error::Error;
use crate::state::AppState;

/// Request for POST /extension/{id}/toggle
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// Response for POST /extension/{id}/uninstall
#[derive(Debug, Clone, Serialize)]
pub struct Uninstalled {
    pub id: String,
}

/// Apply `op` to `id` and answer with the refreshed listing entry.
async fn transition<F>(state: &AppState, id: String, op: F) -> ApiResult<RegistryEntry>
where
    F: FnOnce(&LifecycleManager, &str) -> forum_extensions::Result<ExtensionManifest>
        + Send
        + 'static,
{
    let entry = state
        .blocking(move |lifecycle| {
            op(lifecycle, &id)?;
            lifecycle.registry().entry(&id)
        })
        .await?;
    Ok(ApiResponse::ok(entry))
}

/// GET /extension
pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Vec<RegistryEntry>> {
    let entries = state
        .blocking(|lifecycle| lifecycle.registry().entries())
        .await?;
    Ok(ApiResponse::ok(entries))
}

/// GET /extension/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<ExtensionStats> {
    let stats = state.blocking(|lifecycle| lifecycle.registry().stats()).await?;
    Ok(ApiResponse::ok(stats))
}

/// GET /extension/config
///
/// The index file exactly as stored, or `null` when none has been written.
pub async fn raw_index(State(state): State<Arc<AppState>>) -> ApiResult<Option<Value>> {
    let index = state
        .blocking(|lifecycle| {
            let path = lifecycle.store().index_path();
            let Some(content) = forum_fs::io::read_optional(&path)? else {
                return Ok(None);
            };
            serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| forum_extensions::Error::Parse {
                    path: path.to_native(),
                    message: e.to_string(),
                })
        })
        .await?;
    Ok(ApiResponse::ok(index))
}

/// GET /extension/integrations
pub async fn integrations(State(state): State<Arc<AppState>>) -> ApiResult<RegistrySnapshot> {
    Ok(ApiResponse::ok(state.integrations.snapshot().as_ref().clone()))
}

/// POST /extension/{id}/install
///
/// The body is the raw zip archive. The archive's manifest must declare `id`.
pub async fn install(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<RegistryEntry> {
    if body.is_empty() {
        return Err(Error::user("request body must be a zip archive"));
    }
    let user = request_user(&headers);
    tracing::debug!(extension_id = %id, user = %user, bytes = body.len(), "Install requested");

    transition(&state, id, move |lifecycle, id| {
        lifecycle.install(&body, Some(id), &user)
    })
    .await
}

/// POST /extension/{id}/uninstall
pub async fn uninstall(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Uninstalled> {
    let removed = id.clone();
    state
        .blocking(move |lifecycle| lifecycle.uninstall(&removed))
        .await?;
    Ok(ApiResponse::ok(Uninstalled { id }))
}

/// POST /extension/{id}/enable
pub async fn enable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RegistryEntry> {
    transition(&state, id, LifecycleManager::enable).await
}

/// POST /extension/{id}/disable
pub async fn disable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RegistryEntry> {
    transition(&state, id, LifecycleManager::disable).await
}

/// POST /extension/{id}/reload
pub async fn reload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RegistryEntry> {
    transition(&state, id, LifecycleManager::reload).await
}

/// POST /extension/{id}/activate
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RegistryEntry> {
    transition(&state, id, LifecycleManager::activate).await
}

/// POST /extension/{id}/toggle
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<RegistryEntry> {
    transition(&state, id, move |lifecycle, id| {
        lifecycle.toggle(id, req.enabled)
    })
    .await
}
