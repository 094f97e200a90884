//! Conditional GET support.
//!
//! Responses carry `Last-Modified` and a `Cache-Control` that makes clients
//! revalidate every time; revalidation is answered with `304 Not Modified`
//! when `If-Modified-Since` is not older than the file.

use axum::http::header::{self, HeaderMap, HeaderName};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const HTTP_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

pub(crate) const CACHE_CONTROL: &str = "private, max-age=0, no-cache";

/// Format a timestamp as an HTTP date, in GMT, truncated to whole seconds.
pub(crate) fn http_date(timestamp: OffsetDateTime) -> String {
    let utc = timestamp.to_offset(UtcOffset::UTC);
    // The description only uses components every `OffsetDateTime` has.
    utc.format(HTTP_DATE).unwrap_or_default()
}

pub(crate) fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), HTTP_DATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Whether a resource last modified at `modified` must be sent in full.
///
/// HTTP dates have whole-second precision, so `modified` is compared at that
/// precision too; otherwise a client echoing `Last-Modified` back would never
/// get a 304. A malformed header is ignored.
pub(crate) fn is_modified(headers: &HeaderMap, modified: OffsetDateTime) -> bool {
    let Some(value) = headers.get(header::IF_MODIFIED_SINCE) else {
        return true;
    };
    let Some(since) = value.to_str().ok().and_then(parse_http_date) else {
        tracing::info!(value = ?value, "Ignoring unparseable If-Modified-Since header");
        return true;
    };
    since.unix_timestamp() < modified.unix_timestamp()
}

/// `Last-Modified` and `Cache-Control` for a resource.
pub(crate) fn cache_headers(modified: OffsetDateTime) -> [(HeaderName, String); 2] {
    [
        (header::LAST_MODIFIED, http_date(modified)),
        (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
    ]
}
