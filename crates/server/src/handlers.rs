use crate::AppState;
use crate::caching::{cache_headers, is_modified};
use crate::error::Failure;
use crate::query::{self, Canonicalized, PREVIEW, RETINA};
use crate::variant::{Variant, thumbnail_path_for};
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use shelf_storage::FileInfo;
use tokio_util::io::ReaderStream;
use tracing::instrument;

type Handled = Result<Response, Failure>;

fn redirect(location: String) -> Response {
    tracing::debug!(location = %location, "Redirecting to canonical request");
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

/// `GET /readdir?path=<dir>`: the entries of a directory as JSON.
#[instrument(skip_all, fields(uri = %uri))]
pub(crate) async fn readdir(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Handled {
    let query = match query::canonicalize(&uri, &[]) {
        Canonicalized::Canonical(query) => query,
        Canonicalized::Redirect(location) => return Ok(redirect(location)),
    };
    let path = query.path();

    let directory = state.storage.stat(path).await.map_err(Failure::storage)?;
    if !directory.is_dir {
        return Err(Failure::new(StatusCode::BAD_REQUEST));
    }
    if !is_modified(&headers, directory.modified) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let listing = state.storage.list(path).await.map_err(Failure::internal)?;
    tracing::debug!(path, entries = listing.len(), "Listed directory");
    Ok((cache_headers(directory.modified), Json(listing)).into_response())
}

/// `GET /read?path=<file>[&preview=1][&retina=1]`: a file, or its thumbnail.
#[instrument(skip_all, fields(uri = %uri))]
pub(crate) async fn read(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Handled {
    let query = match query::canonicalize(&uri, &[PREVIEW, RETINA]) {
        Canonicalized::Canonical(query) => query,
        Canonicalized::Redirect(location) => return Ok(redirect(location)),
    };
    let path = query.path();

    if query.contains(PREVIEW) {
        let variant = Variant::from_request(query.contains(RETINA));
        let thumbnail_path = thumbnail(&state, path, variant).await?;
        return serve_file(&state, &thumbnail_path, &headers).await;
    }
    serve_file(&state, path, &headers).await
}

/// Make sure an up-to-date thumbnail of `path` exists and return its request
/// path.
///
/// An existing thumbnail is reused unless its source has been modified since.
/// Otherwise the request waits on the scheduler, together with every other
/// request for the same thumbnail.
async fn thumbnail(state: &AppState, path: &str, variant: Variant) -> Result<String, Failure> {
    let source = state.storage.stat(path).await.map_err(Failure::storage)?;
    if source.is_dir {
        return Err(Failure::new(StatusCode::BAD_REQUEST));
    }

    let request_path = variant.request_path(path);
    match state.storage.stat(&request_path).await {
        Ok(existing) if existing.modified >= source.modified => {
            tracing::trace!(thumbnail = %request_path, "Serving existing thumbnail");
            return Ok(request_path);
        },
        Ok(_) => tracing::debug!(thumbnail = %request_path, "Thumbnail is older than its source"),
        Err(err) if err.is_not_found() => {},
        Err(err) => return Err(Failure::internal(err)),
    }

    let source_path = state.storage.absolute_path(path).map_err(Failure::storage)?;
    let destination = thumbnail_path_for(state.storage.root(), path, variant);
    state
        .scheduler
        .make_thumbnail(source_path, destination, variant.dimension())
        .await
        .map_err(Failure::thumbnail)?;
    Ok(request_path)
}

async fn serve_file(state: &AppState, path: &str, headers: &HeaderMap) -> Handled {
    let (file, info) = state.storage.open(path).await.map_err(Failure::storage)?;
    if !is_modified(headers, info.modified) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let mime = mime_guess::from_path(&info.name).first_or_octet_stream();
    tracing::debug!(path, size = info.size, mime = %mime, "Serving file");
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        cache_headers(info.modified),
        [
            (header::CONTENT_TYPE, content_type(&mime)),
            (header::CONTENT_DISPOSITION, content_disposition(&info)),
            (header::CONTENT_LENGTH, HeaderValue::from(info.size)),
        ],
        body,
    )
        .into_response())
}

fn content_type(mime: &mime_guess::Mime) -> HeaderValue {
    HeaderValue::from_str(mime.as_ref()).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// `filename=<name>`, with control characters (which can't appear in a header)
/// replaced.
fn content_disposition(info: &FileInfo) -> HeaderValue {
    let name: String = info.name.chars().map(|c| if c.is_control() { '_' } else { c }).collect();
    HeaderValue::from_bytes(format!("filename={name}").as_bytes()).unwrap_or_else(|_| HeaderValue::from_static("inline"))
}
