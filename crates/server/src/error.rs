//! Server Error Types
//!
//! [`ErrorKind`] covers what can stop the server itself. Failures while
//! answering a single request never propagate that far: they become a
//! [`Failure`] and are rendered as an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use derive_more::{Display, Error};
use shelf_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use shelf_thumbnail::error::Error as ThumbnailError;
use std::net::SocketAddr;
use std::path::PathBuf;

/// A server error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The standard thumbnail directory could not be created under the root
    #[display("could not prepare thumbnail directory: {}", _0.display())]
    Prepare(#[error(not(source))] PathBuf),
    /// The listening socket could not be inspected
    #[display("could not bind {_0}")]
    Bind(#[error(not(source))] SocketAddr),
    /// The server stopped with an I/O error
    #[display("HTTP server failed")]
    Serve,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Bind(_) | Self::Serve)
    }
}

/// A request that could not be answered normally.
#[derive(Debug)]
pub(crate) struct Failure {
    status: StatusCode,
}

impl Failure {
    pub(crate) fn new(status: StatusCode) -> Self {
        Self { status }
    }

    /// Map a storage error onto the status the client sees: missing paths are
    /// 404, the wrong kind of path is 400, and anything else is 500.
    pub(crate) fn storage(err: StorageError) -> Self {
        let status = match &*err {
            StorageErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            StorageErrorKind::NotADirectory(_) | StorageErrorKind::IsADirectory(_) | StorageErrorKind::InvalidPath(_) => {
                StatusCode::BAD_REQUEST
            },
            StorageErrorKind::PermissionDenied(_) | StorageErrorKind::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = ?err, "Storage failure");
        } else {
            tracing::debug!(error = ?err, status = status.as_u16(), "Rejected request");
        }
        Self { status }
    }

    /// A storage error that can only mean something is wrong on our side,
    /// such as a directory that was stat'ed fine but can't be read.
    pub(crate) fn internal(err: StorageError) -> Self {
        tracing::warn!(error = ?err, "Storage failure");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Every failed thumbnail is a 500; the cause is only logged.
    pub(crate) fn thumbnail(err: ThumbnailError) -> Self {
        tracing::warn!(error = ?err, "Thumbnail unavailable");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let reason = self.status.canonical_reason().unwrap_or_default();
        (self.status, reason).into_response()
    }
}
