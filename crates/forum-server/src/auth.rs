//! Bearer-token authentication for admin routes.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};

use crate::error::Error;
use crate::state::AppState;

/// Header naming the admin performing an install.
pub const USER_HEADER: &str = "x-forum-user";

/// User recorded when [`USER_HEADER`] is absent.
pub const DEFAULT_USER: &str = "admin";

/// Reject requests without the configured bearer token.
///
/// Passes everything through when no token is configured. Rejections carry
/// the usual error body with status 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if tokens_match(token, expected) => Ok(next.run(request).await),
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated request");
            Err(Error::Unauthorized)
        }
    }
}

/// Compare without stopping at the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Admin user id from the request headers.
pub fn request_user(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}

/// Generates a random admin token.
#[must_use]
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
