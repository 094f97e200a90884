//! Local filesystem storage backend.
//!
//! This module provides read access to one directory tree on the local
//! filesystem, using `tokio::fs` for async I/O.

use crate::error::{ErrorKind, Result};
use crate::{FileInfo, path::validate as validate_path};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};

/// Local filesystem storage backend.
///
/// All request paths are relative to the configured root directory; see the
/// [module docs](crate::backend) for their format.
///
/// # Examples
///
/// ```no_run
/// use shelf_storage::LocalBackend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("/srv/photos")?;
/// for entry in backend.list("/2024").await? {
///     println!("{} ({} bytes)", entry.name, entry.size);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Root directory everything is served from
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, does not exist, or is
    /// not a directory. The root is never created.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        // Use non-async here; it'll only happen once on startup and it's not
        // worth the hassle of making the constructor async.
        let metadata = std::fs::metadata(&root).map_err(|e| Self::map_io_error(e, &root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute filesystem path for a request path.
    ///
    /// The request path is canonicalized, so the result is always inside the
    /// root.
    pub fn absolute_path(&self, request_path: &str) -> Result<PathBuf> {
        let validated = validate_path(request_path)?;
        Ok(self.root.join(validated))
    }

    /// Metadata for a single path, following symlinks.
    pub async fn stat(&self, request_path: &str) -> Result<FileInfo> {
        let abs_path = self.absolute_path(request_path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, &abs_path))?;
        Ok(FileInfo::from_metadata(self.name_of(&abs_path), &metadata).map_err(ErrorKind::Io)?)
    }

    /// The immediate entries of a directory, sorted by name.
    ///
    /// Entries are described without following symlinks. An entry that
    /// disappears between being listed and being examined is left out.
    pub async fn list(&self, request_path: &str) -> Result<Vec<FileInfo>> {
        let abs_path = self.absolute_path(request_path)?;
        let mut entries = fs::read_dir(&abs_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotADirectory => ErrorKind::NotADirectory(abs_path.clone()),
            _ => Self::map_io_error(e, &abs_path),
        })?;

        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &abs_path))? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %entry.path().display(), "Entry vanished while listing directory");
                    continue;
                },
                Err(e) => exn::bail!(Self::map_io_error(e, &entry.path())),
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            listing.push(FileInfo::from_metadata(name, &metadata).map_err(ErrorKind::Io)?);
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Open a regular file for reading, along with its metadata.
    ///
    /// The metadata is taken from the open handle, so it describes exactly
    /// the file being read.
    pub async fn open(&self, request_path: &str) -> Result<(File, FileInfo)> {
        let abs_path = self.absolute_path(request_path)?;
        let file = File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, &abs_path))?;
        let metadata = file.metadata().await.map_err(|e| Self::map_io_error(e, &abs_path))?;
        if metadata.is_dir() {
            exn::bail!(ErrorKind::IsADirectory(abs_path));
        }
        let info = FileInfo::from_metadata(self.name_of(&abs_path), &metadata).map_err(ErrorKind::Io)?;
        Ok((file, info))
    }

    /// Create a directory (and any missing parents) under the root.
    pub async fn ensure_directory(&self, request_path: &str) -> Result<PathBuf> {
        let abs_path = self.absolute_path(request_path)?;
        fs::create_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, &abs_path))?;
        Ok(abs_path)
    }

    fn name_of(&self, abs_path: &Path) -> String {
        abs_path
            .file_name()
            .or_else(|| self.root.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            // A file where a directory was expected somewhere along the path
            // (`/photo.jpg/x`) means the path itself doesn't exist.
            std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}
