pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::LocalBackend;
pub use crate::models::FileInfo;
pub use crate::path::{canonicalize as canonicalize_path, validate as validate_path};
