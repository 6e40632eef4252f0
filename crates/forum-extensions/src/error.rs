use std::path::PathBuf;

use serde::Serialize;

use crate::schema::FieldError;

/// Errors that can occur in the extension system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Manifest content is malformed or fails validation.
    #[error("invalid extension manifest: {reason}")]
    InvalidManifest { reason: String },

    /// Uploaded archive is unusable.
    #[error("invalid extension archive: {0}")]
    InvalidArchive(String),

    /// Configuration rejected by the extension's schema.
    #[error("invalid configuration for '{id}': {}", summarize(.errors))]
    InvalidConfig { id: String, errors: Vec<FieldError> },

    /// An extension with this id is already installed.
    #[error("extension '{0}' is already installed")]
    AlreadyInstalled(String),

    /// No extension with this id exists.
    #[error("unknown extension: {0}")]
    NotFound(String),

    /// The extension is built-in and cannot be removed.
    #[error("extension '{0}' is protected and cannot be uninstalled")]
    Protected(String),

    /// A theme-only operation was attempted on a plugin.
    #[error("extension '{0}' is not a theme")]
    NotATheme(String),

    /// The index changed between read and conditional write.
    #[error("extension index changed concurrently (expected revision {expected}, found {actual})")]
    StaleIndex { expected: u64, actual: u64 },

    /// Stored JSON could not be parsed.
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// Filesystem layer failure.
    #[error(transparent)]
    Fs(forum_fs::Error),

    /// Archive could not be read.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Raw I/O error outside the filesystem layer.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse error classification surfaced to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Io,
    Parse,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for callers that render targeted guidance.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidManifest { .. }
            | Self::InvalidArchive(_)
            | Self::InvalidConfig { .. }
            | Self::NotATheme(_) => ErrorKind::Validation,
            Self::AlreadyInstalled(_) | Self::StaleIndex { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Protected(_) => ErrorKind::Forbidden,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Fs(_) | Self::Io { .. } => ErrorKind::Io,
            Self::Zip(zip::result::ZipError::Io(_)) => ErrorKind::Io,
            Self::Zip(_) => ErrorKind::Validation,
        }
    }
}

impl From<forum_fs::Error> for Error {
    fn from(err: forum_fs::Error) -> Self {
        match err {
            forum_fs::Error::ConfigParse { path, message, .. } => Self::Parse { path, message },
            other => Self::Fs(other),
        }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.key, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
