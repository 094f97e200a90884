//! Request path canonicalization and validation.
//!
//! Request paths arrive from query strings, so they can contain anything.
//! [`canonicalize`] turns them into a single lexical form that never leaves
//! the root; [`validate`] turns that form into a relative filesystem path.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Lexically cleans a request path into its canonical, rooted form.
///
/// The result always starts with `/`, has no empty, `.` or `..` segments and
/// no trailing slash (except for the root itself). `..` at the root stays at
/// the root. The filesystem is never consulted.
///
/// # Examples
///
/// ```
/// use shelf_storage::canonicalize_path;
/// assert_eq!(canonicalize_path(""), "/");
/// assert_eq!(canonicalize_path("photos"), "/photos");
/// assert_eq!(canonicalize_path("/a//b/./c/"), "/a/b/c");
/// assert_eq!(canonicalize_path("/../../etc/passwd"), "/etc/passwd");
/// ```
pub fn canonicalize(raw: &str) -> String {
    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Converts a request path into a path relative to the storage root.
///
/// The path is canonicalized first, so the result never escapes the root. The
/// root itself becomes an empty path.
///
/// > **Note:** Null bytes pass through [`canonicalize`] untouched but cause
/// >           truncation in C-based syscalls, so they are rejected here.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::validate_path;
/// assert_eq!(validate_path("/album/../photo.jpg").unwrap(), Path::new("photo.jpg"));
/// assert_eq!(validate_path("/").unwrap(), Path::new(""));
/// assert!(validate_path("/a\0b").is_err());
/// ```
pub fn validate(request_path: &str) -> Result<PathBuf> {
    let canonical = canonicalize(request_path);
    let relative = Path::new(canonical.trim_start_matches('/'));
    let mut validated = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(s) if !s.as_encoded_bytes().contains(&0) => validated.push(s),
            // Anything else here means the platform parsed the segment
            // differently from `canonicalize` (drive prefixes, NUL, ...).
            _ => exn::bail!(ErrorKind::InvalidPath(PathBuf::from(request_path))),
        }
    }
    Ok(validated)
}
