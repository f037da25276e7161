//! Collapse instance identifiers in request paths so requests group by
//! endpoint shape: `/v1/volumes/3fa85f64-...` becomes `/v1/volumes/*`.

use uuid::Uuid;

/// Replacement for a path segment that encodes a UUID.
pub const WILDCARD: &str = "*";

/// Strip the textual conventions a UUID may be wrapped in: `urn:` and
/// `uuid:` prefixes, `{}` braces and hyphens. The result is lowercased.
fn strip_uuid_conventions(candidate: &str) -> String {
    candidate
        .replace("urn:", "")
        .replace("uuid:", "")
        .trim_matches(|c: char| c == '{' || c == '}')
        .replace('-', "")
        .to_lowercase()
}

/// Whether `candidate` is a UUID in any common textual encoding.
///
/// The stripped candidate must be exactly the 32 hex digits a canonical
/// rendering of the parsed UUID produces. Anything that does not parse is
/// simply not UUID-like.
pub fn is_uuid_like(candidate: &str) -> bool {
    let stripped = strip_uuid_conventions(candidate);
    if stripped.len() != 32 {
        return false;
    }
    match Uuid::try_parse(&stripped) {
        Ok(uuid) => uuid.simple().to_string() == stripped,
        Err(_) => false,
    }
}

/// Normalize a request URI into a grouping key.
///
/// The query string is dropped, and every `/`-separated segment that is
/// UUID-like is replaced by [`WILDCARD`]. Empty segments are preserved, so
/// leading, trailing and doubled slashes survive unchanged.
pub fn normalize_path(uri: &str) -> String {
    let path = uri.split_once('?').map_or(uri, |(path, _)| path);
    path.split('/')
        .map(|segment| {
            if is_uuid_like(segment) {
                WILDCARD
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
