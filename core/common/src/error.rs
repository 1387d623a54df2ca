//! Common error types for FileStore.

use std::io;

use thiserror::Error;

/// Error taxonomy shared by every storage driver.
#[derive(Debug, Error)]
pub enum Error {
    /// Target path or key is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Target already exists in a form the operation cannot overwrite.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Backend refused the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Transport or authentication failure talking to the backend.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Malformed path or name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stream copy or filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Check if this is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Classify an HTTP status returned by a remote backend.
    ///
    /// Only meaningful for non-success statuses.
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            404 => Error::NotFound(context),
            401 | 403 => Error::PermissionDenied(context),
            400 => Error::InvalidArgument(context),
            _ => Error::BackendUnavailable(format!("{} (status {})", context, status)),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(err.to_string()),
            io::ErrorKind::AlreadyExists => Error::AlreadyExists(err.to_string()),
            _ => Error::Io(err),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
