//! Query string parsing and canonicalization.
//!
//! Every endpoint accepts exactly one spelling of each request. Anything else
//! is answered with a permanent redirect to that spelling, so caches and
//! clients only ever see canonical URLs.

use axum::http::Uri;
use shelf_storage::canonicalize_path;
use std::collections::BTreeMap;

pub(crate) const PATH: &str = "path";
pub(crate) const PREVIEW: &str = "preview";
pub(crate) const RETINA: &str = "retina";

/// Decoded query parameters. Keys are kept sorted; repeated keys keep their
/// values in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Query {
    params: BTreeMap<String, Vec<String>>,
}

impl Query {
    pub(crate) fn parse(raw: &str) -> Self {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            params.entry(key.into_owned()).or_default().push(value.into_owned());
        }
        Self { params }
    }

    /// First value of `key`.
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Replace every value of `key` with `value`.
    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(key.to_string(), vec![value.into()]);
    }

    fn remove(&mut self, key: &str) {
        self.params.remove(key);
    }

    /// `application/x-www-form-urlencoded`, keys in sorted order.
    pub(crate) fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.params {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }

    /// The canonical request path. Only meaningful once canonicalized.
    pub(crate) fn path(&self) -> &str {
        self.get(PATH).unwrap_or("/")
    }

    /// Rewrite `path` into its canonical form, adding it if absent.
    fn canonicalize_path(&mut self) {
        let raw = self.get(PATH).unwrap_or_default();
        let canonical = canonicalize_path(raw);
        if canonical != raw {
            self.set(PATH, canonical);
        }
    }

    /// A present flag is either `1` or gone: `""` and `"0"` remove it, any
    /// other value becomes `1`.
    fn canonicalize_flag(&mut self, key: &str) {
        match self.get(key) {
            None | Some("1") => {},
            Some("" | "0") => self.remove(key),
            Some(_) => self.set(key, "1"),
        }
    }
}

/// Outcome of checking a request against its canonical form.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Canonicalized {
    /// The request is already canonical.
    Canonical(Query),
    /// The request should be repeated at this location.
    Redirect(String),
}

/// Canonicalize the query of `uri`, treating `flags` as boolean parameters.
///
/// The request is canonical only if re-encoding the canonical query
/// reproduces the raw query byte for byte.
pub(crate) fn canonicalize(uri: &Uri, flags: &[&str]) -> Canonicalized {
    let raw = uri.query().unwrap_or_default();
    let mut query = Query::parse(raw);
    query.canonicalize_path();
    for flag in flags {
        query.canonicalize_flag(flag);
    }
    let encoded = query.encode();
    if encoded == raw {
        Canonicalized::Canonical(query)
    } else {
        Canonicalized::Redirect(format!("{}?{}", uri.path(), encoded))
    }
}
