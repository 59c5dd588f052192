//! Header projection for both legs of the exchange.
//!
//! # Responsibilities
//! - Build outbound headers: drop `Content-Length`, pin `Host` to the target
//! - Inject the caller's backend session cookie when one is known
//! - Replace `Content-Type` after a multipart body is re-encoded
//! - Filter backend response headers before they reach the client
//!
//! # Design Decisions
//! - `HeaderMap` keys are case-insensitive, so lookups never lowercase by hand
//! - Cookie injection appends; existing client cookies are preserved

use axum::http::{header, HeaderMap, HeaderValue};

use crate::proxy::error::ProxyError;
use crate::proxy::target::ProxyTarget;

/// Session credential forwarded to the backend as a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie<'a> {
    pub name: &'a str,
    pub token: &'a str,
}

/// Build the outbound header set from the inbound one.
pub fn project_headers(
    inbound: &HeaderMap,
    target: &ProxyTarget,
    session: Option<SessionCookie<'_>>,
) -> Result<HeaderMap, ProxyError> {
    let host = HeaderValue::from_str(&target.authority())
        .map_err(|_| ProxyError::InvalidOutbound(format!("host '{}'", target.authority())))?;

    let mut outbound = HeaderMap::with_capacity(inbound.keys_len() + 1);
    for name in inbound.keys() {
        if *name == header::CONTENT_LENGTH {
            continue;
        }
        if *name == header::HOST {
            outbound.insert(header::HOST, host.clone());
            continue;
        }
        for value in inbound.get_all(name) {
            outbound.append(name.clone(), value.clone());
        }
    }
    // Always present, even when the client omitted it (HTTP/2 :authority).
    outbound.insert(header::HOST, host);

    if let Some(session) = session {
        let cookie = HeaderValue::from_str(&format!("{}={}", session.name, session.token))
            .map_err(|_| ProxyError::InvalidOutbound("session cookie".to_string()))?;
        outbound.append(header::COOKIE, cookie);
    }

    Ok(outbound)
}

/// Overwrite `Content-Type` after the body was re-encoded.
pub fn replace_content_type(headers: &mut HeaderMap, content_type: &str) -> Result<(), ProxyError> {
    let value = HeaderValue::from_str(content_type)
        .map_err(|_| ProxyError::InvalidOutbound(format!("content type '{}'", content_type)))?;
    headers.insert(header::CONTENT_TYPE, value);
    Ok(())
}

/// Copy backend response headers for the client, dropping chunked framing.
pub fn response_headers(backend: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(backend.keys_len());
    for (name, value) in backend.iter() {
        if *name == header::TRANSFER_ENCODING && is_chunked(value) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn is_chunked(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|v| v.split(',').any(|coding| coding.trim().eq_ignore_ascii_case("chunked")))
        .unwrap_or(false)
}
