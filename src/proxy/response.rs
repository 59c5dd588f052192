//! Client responses built from backend responses.
//!
//! # Responsibilities
//! - Stream passthrough bodies chunk by chunk
//! - Emit rewritten redirects with an empty body
//! - Emit 304 responses with `Content-Length: 0` and no body

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use futures_util::TryStreamExt;

use crate::proxy::error::ProxyError;
use crate::proxy::forwarder::ProxyResponse;
use crate::proxy::headers::response_headers;

/// Stream the backend response to the client, status preserved.
pub fn stream(backend: ProxyResponse) -> Response {
    let status = backend.status();
    let headers = response_headers(backend.headers());

    let body = backend.into_body_stream().inspect_err(|e| {
        tracing::warn!(error = %e, "Backend body stream failed");
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Stream the backend response with its `Location` replaced.
pub fn relocate(backend: ProxyResponse, location: &str) -> Result<Response, ProxyError> {
    let location = HeaderValue::from_str(location)
        .map_err(|_| ProxyError::InvalidOutbound(format!("location '{}'", location)))?;
    let mut response = stream(backend);
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

/// Redirect the client to `location`, keeping the backend's status and headers.
///
/// The backend body is dropped unread.
pub fn redirect(backend: ProxyResponse, location: &str) -> Result<Response, ProxyError> {
    let status = backend.status();
    let mut headers = response_headers(backend.headers());
    drop(backend);

    let location = HeaderValue::from_str(location)
        .map_err(|_| ProxyError::InvalidOutbound(format!("location '{}'", location)))?;
    headers.insert(header::LOCATION, location);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    headers.remove(header::TRANSFER_ENCODING);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// 304 with explicit zero length, whatever the backend sent as a body.
pub fn not_modified(backend: ProxyResponse) -> Response {
    let mut headers = response_headers(backend.headers());
    drop(backend);

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    headers.remove(header::TRANSFER_ENCODING);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(status: u16, headers: &[(&'static str, &'static str)], body: &'static str) -> ProxyResponse {
        let mut builder = axum::http::Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = builder.body(reqwest::Body::from(body)).unwrap();
        ProxyResponse::from(reqwest::Response::from(response))
    }

    async fn body_bytes(response: Response) -> bytes::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn passthrough_preserves_status_headers_and_bytes() {
        let response = stream(backend(
            201,
            &[("etag", "\"v2\""), ("transfer-encoding", "chunked"), ("x-trace", "1")],
            "created \u{1F4C4}",
        ));

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["etag"], "\"v2\"");
        assert_eq!(response.headers()["x-trace"], "1");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(&body_bytes(response).await[..], "created \u{1F4C4}".as_bytes());
    }

    #[tokio::test]
    async fn redirect_discards_backend_body() {
        let response = redirect(
            backend(302, &[("location", "http://backend.example/api/login"), ("set-cookie", "a=1")], "moved"),
            "https://public.example/app/login",
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://public.example/app/login");
        assert_eq!(response.headers()[header::SET_COOKIE], "a=1");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn relocate_streams_body_under_rewritten_location() {
        let response = relocate(
            backend(307, &[("location", "http://backend.example/api/upload2")], "retry there"),
            "https://public.example/app/upload2",
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "https://public.example/app/upload2");
        assert_eq!(&body_bytes(response).await[..], b"retry there");
    }

    #[tokio::test]
    async fn not_modified_is_always_empty() {
        let response = not_modified(backend(
            304,
            &[("etag", "\"v1\""), ("content-length", "11")],
            "stale bytes",
        ));

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
        assert_eq!(response.headers()["etag"], "\"v1\"");
        assert!(body_bytes(response).await.is_empty());
    }
}
