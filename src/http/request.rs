//! Request identification.
//!
//! # Responsibilities
//! - Generate a UUID v4 `x-request-id` when the client sent none
//! - Echo the id on the response
//! - Attach the id to the per-request trace span
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The id travels to the backend with the other projected headers

use axum::body::Body;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Span;

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Layer that assigns request IDs to requests lacking one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid)
}

/// Layer that copies the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID.clone())
}

/// Request ID of a request, `"unknown"` when absent.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Span for one inbound request.
pub fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request),
        method = %request.method(),
        path = %request.uri().path(),
    )
}
