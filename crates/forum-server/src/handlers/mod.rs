//! Route handlers and the response envelope they share.

pub mod configs;
pub mod events;
pub mod extensions;
pub mod system;

use axum::Json;
use serde::Serialize;

use crate::error::Error;

/// Body of every successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, Error>;
