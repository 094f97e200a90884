//! HTTP surface of the file browser.
//!
//! Two endpoints, both `GET`, both addressed by query string:
//! - `/readdir?path=<dir>` lists a directory as JSON.
//! - `/read?path=<file>` downloads a file; with `&preview=1` it serves a
//!   thumbnail instead (`&retina=1` for the 2x variant), creating it through
//!   the [`Scheduler`] first when necessary.
//!
//! Every response allows any origin. Non-canonical queries are redirected to
//! their canonical spelling before anything touches the filesystem.

mod caching;
pub mod error;
mod handlers;
mod query;
mod variant;

pub use crate::variant::{Variant, thumbnail_path_for};
use crate::error::{ErrorKind, Result};
use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::get;
use exn::ResultExt;
use shelf_storage::LocalBackend;
use shelf_thumbnail::Scheduler;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    storage: LocalBackend,
    scheduler: Scheduler,
}

impl AppState {
    pub fn new(storage: LocalBackend, scheduler: Scheduler) -> Self {
        Self { storage, scheduler }
    }

    pub fn storage(&self) -> &LocalBackend {
        &self.storage
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/read", get(handlers::read))
        .route("/readdir", get(handlers::readdir))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the standard thumbnail directory under the root if it is missing.
pub async fn prepare(storage: &LocalBackend) -> Result<PathBuf> {
    let directory = Variant::Standard.directory();
    let created = storage
        .ensure_directory(&format!("/{directory}"))
        .await
        .map_err(|err| err.raise(ErrorKind::Prepare(storage.root().join(directory))))?;
    tracing::debug!(path = %created.display(), "Thumbnail directory ready");
    Ok(created)
}

/// Serve on `listen` until `shutdown` resolves, then wait for in-flight
/// requests to finish.
pub async fn serve<F>(listen: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(listen).await.or_raise(|| ErrorKind::Bind(listen))?;
    let local = listener.local_addr().or_raise(|| ErrorKind::Bind(listen))?;
    tracing::info!(
        listen = %local,
        root = %state.storage.root().display(),
        converter = state.scheduler.converter(),
        max_conversions = state.scheduler.max_conversions(),
        "Serving"
    );
    let scheduler = state.scheduler.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .or_raise(|| ErrorKind::Serve)?;
    scheduler.log_stats();
    Ok(())
}
