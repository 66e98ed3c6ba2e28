//! URL utilities for building service endpoints
//!
//! Every endpoint is derived from the single configured base address. Path
//! segments are percent-encoded individually, so manuscript identifiers and
//! character names may contain spaces or slashes.

use reqwest::Url;

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use manuscript_sync::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8000"), "http://localhost:8000");
/// assert_eq!(normalize_base_url("http://localhost:8000///"), "http://localhost:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Build an endpoint URL by appending percent-encoded path segments
///
/// Returns `None` when the base address is not an absolute URL that can carry
/// a path.
///
/// # Examples
///
/// ```
/// use manuscript_sync::utils::url::endpoint_url;
///
/// let url = endpoint_url("http://localhost:8000/", &["analytics", "character-arc", "m1", "Little Match Girl"])
///     .unwrap();
/// assert_eq!(
///     url.as_str(),
///     "http://localhost:8000/analytics/character-arc/m1/Little%20Match%20Girl"
/// );
/// ```
pub fn endpoint_url(base_url: &str, segments: &[&str]) -> Option<Url> {
    let mut url = Url::parse(&normalize_base_url(base_url)).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(segments.iter().copied());
    Some(url)
}

/// Build the persistent-connection URL for one manuscript
///
/// `http` bases map to `ws`, `https` to `wss`; `ws`/`wss` bases are kept.
pub fn manuscript_socket_url(base_url: &str, manuscript_id: &str) -> Option<Url> {
    let mut url = endpoint_url(base_url, &["ws", "manuscript", manuscript_id])?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return None,
    };
    url.set_scheme(scheme).ok()?;
    Some(url)
}
