//! Error types for forum-server and their HTTP rendering

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use forum_extensions::ErrorKind;
use serde::Serialize;

/// Result type for server and CLI operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Extensions(#[from] forum_extensions::Error),

    #[error(transparent)]
    Fs(#[from] forum_fs::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Malformed request or command-line input.
    #[error("{message}")]
    User { message: String },

    #[error("missing or invalid admin token")]
    Unauthorized,
}

impl Error {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extensions(e) => e.kind(),
            Self::Fs(forum_fs::Error::ConfigParse { .. }) => ErrorKind::Parse,
            Self::Unauthorized => ErrorKind::Forbidden,
            Self::Fs(forum_fs::Error::UnsupportedFormat { .. }) | Self::User { .. } => {
                ErrorKind::Validation
            }
            Self::Fs(_) | Self::Io(_) | Self::Join(_) => ErrorKind::Io,
        }
    }

    pub fn status(&self) -> StatusCode {
        if matches!(self, Self::Unauthorized) {
            return StatusCode::UNAUTHORIZED;
        }
        match self.kind() {
            ErrorKind::Validation
            | ErrorKind::Conflict
            | ErrorKind::Forbidden
            | ErrorKind::Parse => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body of every failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(error: &Error) -> Self {
        Self {
            success: false,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody::from(&self);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), kind = ?body.kind, error = %body.message, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), kind = ?body.kind, error = %body.message, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}
