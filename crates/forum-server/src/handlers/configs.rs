//! Per-extension configuration endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use forum_extensions::{ExtensionConfigRecord, ValidationReport};
use serde_json::{Map, Value};

use super::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET /extension/configs/{id}
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ExtensionConfigRecord> {
    let record = state
        .blocking(move |lifecycle| lifecycle.configs().get(&id))
        .await?;
    Ok(ApiResponse::ok(record))
}

/// PUT /extension/configs/{id}
///
/// The body is merged over the stored user config and validated before
/// anything is written.
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> ApiResult<ExtensionConfigRecord> {
    let record = state
        .blocking(move |lifecycle| lifecycle.configs().set(&id, patch))
        .await?;
    Ok(ApiResponse::ok(record))
}

/// POST /extension/configs/{id}/reset
pub async fn reset_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ExtensionConfigRecord> {
    let record = state
        .blocking(move |lifecycle| lifecycle.configs().reset(&id))
        .await?;
    Ok(ApiResponse::ok(record))
}

/// POST /extension/configs/{id}/validate
pub async fn validate_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(candidate): Json<Value>,
) -> ApiResult<ValidationReport> {
    let report = state
        .blocking(move |lifecycle| lifecycle.configs().validate(&id, &candidate))
        .await?;
    Ok(ApiResponse::ok(report))
}
