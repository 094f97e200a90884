//! Storage backends.
//!
//! Request paths are always absolute, slash-separated and relative to the
//! backend's root: `/` is the root itself and `/a/b.jpg` is `<root>/a/b.jpg`.
//! They are canonicalized with [`canonicalize_path`](crate::canonicalize_path)
//! before they touch the filesystem, so nothing resolves outside the root.

mod local;

pub use self::local::LocalBackend;
