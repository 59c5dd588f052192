//! Redirect and "not modified" handling.
//!
//! ```text
//! EXECUTED ─┬─ 300..=303, Location present ──▶ REDIRECT (Location rewritten)
//!           ├─ 300..=303, no Location ───────▶ ERROR (MissingLocationHeader)
//!           ├─ 304 ──────────────────────────▶ NOT_MODIFIED (empty body, Content-Length: 0)
//!           ├─ other 3xx, Location present ──▶ RELOCATED (streamed, Location rewritten)
//!           └─ anything else ────────────────▶ PASSTHROUGH (streamed)
//! ```

use axum::http::{header, HeaderMap, StatusCode};

use crate::proxy::error::ProxyError;
use crate::proxy::target::ProxyTarget;

/// What to do with an executed backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Backend `Location` to rewrite and send to the client.
    Redirect(String),
    NotModified,
    /// Another 3xx carrying a `Location`: body streamed, header rewritten.
    Relocated(String),
    Passthrough,
}

/// Classify a backend response by status.
pub fn classify(status: StatusCode, headers: &HeaderMap) -> Result<Disposition, ProxyError> {
    match status.as_u16() {
        300..=303 => headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|location| Disposition::Redirect(location.to_string()))
            .ok_or(ProxyError::MissingLocationHeader(status)),
        304 => Ok(Disposition::NotModified),
        305..=399 => Ok(headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map_or(Disposition::Passthrough, |location| {
                Disposition::Relocated(location.to_string())
            })),
        _ => Ok(Disposition::Passthrough),
    }
}

/// Replace the target's base URL prefix in `location` with `public_base`.
///
/// Absolute locations must start with the target base URL at a segment
/// boundary. Root-relative locations under the target's base path are
/// rewritten the same way. Anything else points outside the backend and
/// is returned unchanged.
pub fn rewrite_location(location: &str, target: &ProxyTarget, public_base: &str) -> String {
    let public_base = public_base.trim_end_matches('/');

    let base_url = target.base_url();
    if let Some(rest) = strip_base(location, &base_url) {
        return format!("{}{}", public_base, rest);
    }

    if location.starts_with('/') && !location.starts_with("//") {
        let base_path = target.base_path().trim_end_matches('/');
        if let Some(rest) = strip_base(location, base_path) {
            return format!("{}{}", public_base, rest);
        }
    }

    location.to_string()
}

/// Strip `base` from `location` when it ends at a path/query/fragment boundary.
fn strip_base<'a>(location: &'a str, base: &str) -> Option<&'a str> {
    let head = location.get(..base.len())?;
    if !head.eq_ignore_ascii_case(base) {
        return None;
    }
    let rest = &location[base.len()..];
    match rest.chars().next() {
        None | Some('/') | Some('?') | Some('#') => Some(rest),
        _ => None,
    }
}
