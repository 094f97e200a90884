//! Storage models.

use serde::Serialize;
use std::fs::Metadata;
use time::OffsetDateTime;

/// Metadata of a single file or directory, as listed to clients.
///
/// Serializes to `{"name", "size", "mtime", "isDir"}` with `mtime` in
/// RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Final path component
    pub name: String,
    /// Size in bytes, as reported by the filesystem
    pub size: u64,
    /// Last modified timestamp
    #[serde(rename = "mtime", with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
}
impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64, modified: OffsetDateTime, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
            is_dir,
        }
    }

    /// Build from filesystem metadata. Fails only on platforms without
    /// modification times.
    pub(crate) fn from_metadata(name: impl Into<String>, metadata: &Metadata) -> std::io::Result<Self> {
        let modified = metadata.modified()?.into();
        Ok(Self::new(name, metadata.len(), modified, metadata.is_dir()))
    }
}
