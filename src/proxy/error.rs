//! Failure taxonomy for a single forward operation.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur while forwarding one request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The inbound request could not be turned into a backend request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Only GET, POST, PUT and DELETE are forwarded.
    #[error("Method {0} is not forwarded")]
    MethodNotAllowed(Method),

    /// The inbound multipart body is malformed.
    #[error("Malformed multipart body: {0}")]
    MultipartParse(String),

    /// A large part could not be written to the spool directory.
    #[error("Failed to spool multipart part: {0}")]
    Spool(#[source] std::io::Error),

    /// A 3xx backend response carried no `Location`.
    #[error("Backend redirect {0} has no Location header")]
    MissingLocationHeader(StatusCode),

    /// Connection or I/O failure talking to the backend.
    #[error("Backend request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend did not answer within the configured deadline.
    #[error("Backend timeout after {0:?}")]
    Timeout(Duration),

    /// The outbound request could not be assembled.
    #[error("Invalid outbound request: {0}")]
    InvalidOutbound(String),
}

impl ProxyError {
    /// Status code surfaced to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) | ProxyError::MultipartParse(_) => StatusCode::BAD_REQUEST,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Transport(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Spool(_)
            | ProxyError::MissingLocationHeader(_)
            | ProxyError::InvalidOutbound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the failure was caused by the client's request.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::MethodNotAllowed(_) => "method_not_allowed",
            ProxyError::MultipartParse(_) => "multipart_parse",
            ProxyError::Spool(_) => "spool",
            ProxyError::MissingLocationHeader(_) => "missing_location",
            ProxyError::Transport(_) => "transport",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::InvalidOutbound(_) => "invalid_outbound",
        }
    }
}

impl From<multer::Error> for ProxyError {
    fn from(e: multer::Error) -> Self {
        ProxyError::MultipartParse(e.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Backend internals stay out of 5xx bodies.
        let body = if status.is_client_error() {
            self.to_string()
        } else {
            status
                .canonical_reason()
                .unwrap_or("Proxy error")
                .to_string()
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status() {
        assert_eq!(ProxyError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::MultipartParse("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::MissingLocationHeader(StatusCode::FOUND).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::MethodNotAllowed(Method::PATCH).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert!(ProxyError::BadRequest("x".into()).is_client_error());
    }

    #[tokio::test]
    async fn server_errors_hide_details() {
        let response = ProxyError::InvalidOutbound("secret internals".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error");
    }

    #[tokio::test]
    async fn client_errors_explain() {
        let response = ProxyError::BadRequest("missing field 'email'".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Bad request: missing field 'email'");
    }
}
