//! Thumbnail size variants and where their files live.

use shelf_storage::canonicalize_path;
use std::path::{Path, PathBuf};

/// The two thumbnail sizes. Each has its own subtree under the root that
/// mirrors the layout of the source images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// 200x200, under `.thumbs`
    Standard,
    /// 400x400 for high-density displays, under `.thumbs@2x`
    Retina,
}

impl Variant {
    pub fn from_request(retina: bool) -> Self {
        if retina { Self::Retina } else { Self::Standard }
    }

    /// Edge length of the square the thumbnail is fitted into.
    pub fn dimension(self) -> u32 {
        match self {
            Self::Standard => 200,
            Self::Retina => 400,
        }
    }

    /// Name of the thumbnail subtree directly under the root.
    pub fn directory(self) -> &'static str {
        match self {
            Self::Standard => ".thumbs",
            Self::Retina => ".thumbs@2x",
        }
    }

    /// Request path of the thumbnail for the image at `request_path`.
    pub fn request_path(self, request_path: &str) -> String {
        format!("/{}{}", self.directory(), canonicalize_path(request_path))
    }
}

/// Filesystem path of the thumbnail for the image at `request_path`:
/// `root/<variant directory>/<request path>`.
pub fn thumbnail_path_for(root: &Path, request_path: &str, variant: Variant) -> PathBuf {
    let canonical = canonicalize_path(request_path);
    root.join(variant.directory()).join(canonical.trim_start_matches('/'))
}
