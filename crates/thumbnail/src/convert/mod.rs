//! The external image converter.
//!
//! The scheduler never touches pixels: it hands a (source, destination,
//! dimension) triple to a [`Converter`] and only cares whether the call
//! succeeded. [`CommandConverter`] shells out to an ImageMagick-compatible
//! executable; [`MockConverter`] (feature `mock`) stands in for it in tests.

mod command;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::command::{CommandConverter, DEFAULT_ARGS, DEFAULT_PROGRAM};
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockConverter;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Shared handle to a converter, as held by the scheduler.
pub type ConverterHandle = Arc<dyn Converter>;

/// Produces a square thumbnail of `source` at `destination`.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Name of the converter, used for logging only.
    fn name(&self) -> &str;

    /// Write a thumbnail of `source`, fitted within a `dimension` x
    /// `dimension` box, to `destination`.
    ///
    /// The parent directory of `destination` already exists when this is
    /// called. On success `destination` holds the complete image; on failure
    /// implementations must not leave partial output behind.
    async fn convert(&self, source: &Path, destination: &Path, dimension: u32) -> Result<()>;
}

/// The square geometry argument understood by the converter (`"200x200"`).
pub fn geometry(dimension: u32) -> String {
    format!("{dimension}x{dimension}")
}
