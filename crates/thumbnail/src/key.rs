use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

/// Identifies one desired thumbnail.
///
/// Requests with equal keys coalesce into a single conversion, so the key
/// holds every parameter that affects the output: the source image, where the
/// thumbnail is written, and its square dimension. Destination paths already
/// encode the size variant (one subtree per variant), but the dimension is
/// kept explicitly so that two variants sharing a subtree can never be merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    source: PathBuf,
    destination: PathBuf,
    dimension: u32,
}

impl ThumbnailKey {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, dimension: u32) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            dimension,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }
}

impl Display for ThumbnailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.source.display(), self.dimension)
    }
}
