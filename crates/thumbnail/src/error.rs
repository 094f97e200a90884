//! Thumbnail Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every failure inside a conversion is reported to waiters as
//! [`ErrorKind::ConversionFailed`], with the original cause kept as the child
//! frame. Kinds are [`Clone`] so that a single outcome can be fanned out to
//! every waiter of a coalesced request.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A thumbnail error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for thumbnail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The work-ticket pool was configured without any tickets.
    #[display("maximum concurrent conversions must be between 1 and {_0}")]
    InvalidConcurrency(#[error(not(source))] usize),
    /// The converter executable could not be found on `PATH`.
    #[display("thumbnail converter not found: {_0}")]
    ConverterNotFound(#[error(not(source))] String),
    /// The parent directory of a thumbnail could not be created.
    #[display("could not create thumbnail directory: {}", _0.display())]
    CreateDirectory(#[error(not(source))] PathBuf),
    /// Temporary output could not be created beside (or moved onto) the destination.
    #[display("could not stage thumbnail output: {}", _0.display())]
    TempFile(#[error(not(source))] PathBuf),
    /// The converter process could not be started.
    #[display("could not spawn converter `{_0}`")]
    Spawn(#[error(not(source))] String),
    /// The converter ran but reported failure.
    #[display("converter `{program}` exited with {status}: {stderr}")]
    ExitStatus { program: String, status: String, stderr: String },
    /// The conversion task ended without reporting an outcome (it panicked,
    /// or the runtime shut down underneath it).
    #[display("thumbnail conversion was abandoned")]
    Abandoned,
    /// What every waiter sees when the conversion for its key failed.
    #[display("thumbnail conversion failed: {}", _0.display())]
    ConversionFailed(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing is retried automatically; a later request for the same
    /// thumbnail always starts a fresh conversion.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreateDirectory(_) | Self::TempFile(_) | Self::Abandoned)
    }
}
