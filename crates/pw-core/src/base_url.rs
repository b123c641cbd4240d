//! URL normalization used for allow-list matching and storage scoping.

use url::{Origin, Url};

/// Reduces a URL to its base form, `scheme://host`.
///
/// Port, path, query, fragment and userinfo are dropped. Returns `None` for
/// empty or unparseable input and for URLs without a host (`data:`,
/// `about:blank`, `file:///...`), so callers treat them as "no match
/// possible".
pub fn base_url(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let url = Url::parse(input).ok()?;
    let host = url.host_str().filter(|host| !host.is_empty())?;
    Some(format!("{}://{host}", url.scheme()))
}

/// Returns the serialized origin (`scheme://host[:port]`) of a URL.
///
/// This is the scope browser local storage is keyed by, so two pages on the
/// same host but different ports keep separate volumes.
pub fn origin_of(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    match url.origin() {
        origin @ Origin::Tuple(..) => Some(origin.ascii_serialization()),
        Origin::Opaque(_) => None,
    }
}
