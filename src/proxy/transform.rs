//! Request transforms: inbound request → outbound request.
//!
//! # Responsibilities
//! - Resolve the outbound URL (path rewrite + verbatim query)
//! - Project headers and inject the session cookie
//! - Choose the outbound body per method (none, raw stream, re-encoded multipart)
//! - Reject requests that cannot be forwarded before any backend call

use axum::body::Body;
use axum::http::{header, request, Method, Request};
use bytes::Bytes;
use serde::Deserialize;

use crate::config::{MultipartConfig, TransformKind};
use crate::proxy::error::ProxyError;
use crate::proxy::headers::{project_headers, replace_content_type, SessionCookie};
use crate::proxy::multipart::{self, MultipartEntity};
use crate::proxy::target::{rewrite_path, PathFilter, ProxyTarget};

/// Largest JSON sign-in body accepted.
const LOGIN_BODY_LIMIT: usize = 64 * 1024;

/// Body of a built outbound request.
#[derive(Debug)]
pub enum OutboundBody {
    Empty,
    /// Inbound bytes passed through untouched.
    Stream(Body),
    /// Body rewritten by the proxy.
    Bytes(Bytes),
    /// Re-encoded multipart entity.
    Multipart(MultipartEntity),
}

/// A fully built request for the backend. Executed exactly once.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: axum::http::HeaderMap,
    pub body: OutboundBody,
}

/// Everything a transform needs besides the request itself.
#[derive(Debug, Clone)]
pub struct TransformContext<'a> {
    pub target: &'a ProxyTarget,
    pub filter: &'a PathFilter,
    pub session: Option<SessionCookie<'a>>,
    pub multipart: &'a MultipartConfig,
}

/// How a mount turns inbound requests into backend requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    Forward,
    JsonLogin,
}

impl From<TransformKind> for Transform {
    fn from(kind: TransformKind) -> Self {
        match kind {
            TransformKind::Forward => Transform::Forward,
            TransformKind::JsonLogin => Transform::JsonLogin,
        }
    }
}

impl Transform {
    pub async fn apply(
        &self,
        request: Request<Body>,
        ctx: &TransformContext<'_>,
    ) -> Result<OutboundRequest, ProxyError> {
        match self {
            Transform::Forward => forward(request, ctx).await,
            Transform::JsonLogin => json_login(request, ctx).await,
        }
    }
}

fn outbound_url(parts: &request::Parts, ctx: &TransformContext<'_>) -> String {
    let path = rewrite_path(parts.uri.path(), ctx.target, ctx.filter);
    ctx.target.url_for(&path, parts.uri.query())
}

async fn forward(
    request: Request<Body>,
    ctx: &TransformContext<'_>,
) -> Result<OutboundRequest, ProxyError> {
    let (parts, body) = request.into_parts();
    let url = outbound_url(&parts, ctx);
    let mut headers = project_headers(&parts.headers, ctx.target, ctx.session.clone())?;

    let body = match parts.method {
        Method::GET | Method::DELETE => OutboundBody::Empty,
        Method::POST | Method::PUT if multipart::is_multipart(&parts.headers) => {
            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let entity = multipart::reconstruct(body, content_type, ctx.multipart).await?;
            replace_content_type(&mut headers, &entity.content_type())?;
            OutboundBody::Multipart(entity)
        }
        Method::POST | Method::PUT => OutboundBody::Stream(body),
        ref other => return Err(ProxyError::MethodNotAllowed(other.clone())),
    };

    Ok(OutboundRequest {
        method: parts.method,
        url,
        headers,
        body,
    })
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

/// Reshape `{"email", "password"}` into the backend's form-encoded login.
async fn json_login(
    request: Request<Body>,
    ctx: &TransformContext<'_>,
) -> Result<OutboundRequest, ProxyError> {
    let (parts, body) = request.into_parts();
    if parts.method != Method::POST {
        return Err(ProxyError::BadRequest(format!(
            "sign-in expects POST, got {}",
            parts.method
        )));
    }

    let raw = axum::body::to_bytes(body, LOGIN_BODY_LIMIT)
        .await
        .map_err(|e| ProxyError::BadRequest(format!("unreadable body: {}", e)))?;
    let login: LoginRequest = serde_json::from_slice(&raw)
        .map_err(|e| ProxyError::BadRequest(format!("invalid JSON: {}", e)))?;

    let email = required(login.email, "email")?;
    let password = required(login.password, "password")?;

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("user", &email)
        .append_pair("password", &password)
        .finish();

    let url = outbound_url(&parts, ctx);
    let mut headers = project_headers(&parts.headers, ctx.target, ctx.session.clone())?;
    replace_content_type(&mut headers, "application/x-www-form-urlencoded")?;

    Ok(OutboundRequest {
        method: Method::POST,
        url,
        headers,
        body: OutboundBody::Bytes(Bytes::from(form)),
    })
}

fn required(value: Option<String>, field: &str) -> Result<String, ProxyError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProxyError::BadRequest(format!("missing field '{}'", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        target: ProxyTarget,
        filter: PathFilter,
        multipart: MultipartConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                target: ProxyTarget::parse("http://backend.example/api").unwrap(),
                filter: PathFilter::strip_prefix("/raw"),
                multipart: MultipartConfig::default(),
            }
        }

        fn ctx(&self) -> TransformContext<'_> {
            TransformContext {
                target: &self.target,
                filter: &self.filter,
                session: None,
                multipart: &self.multipart,
            }
        }
    }

    #[tokio::test]
    async fn get_is_forwarded_without_body() {
        let fx = Fixture::new();
        let request = Request::get("/raw/submission/S-TEST?embed=files")
            .header(header::HOST, "public.example")
            .header(header::CONTENT_LENGTH, "0")
            .body(Body::empty())
            .unwrap();

        let out = Transform::Forward.apply(request, &fx.ctx()).await.unwrap();
        assert_eq!(out.method, Method::GET);
        assert_eq!(out.url, "http://backend.example/api/submission/S-TEST?embed=files");
        assert_eq!(out.headers[header::HOST], "backend.example");
        assert!(out.headers.get(header::CONTENT_LENGTH).is_none());
        assert!(matches!(out.body, OutboundBody::Empty));
    }

    #[tokio::test]
    async fn raw_post_body_streams_through() {
        let fx = Fixture::new();
        let request = Request::post("/raw/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"a\":1}"))
            .unwrap();

        let out = Transform::Forward.apply(request, &fx.ctx()).await.unwrap();
        assert_eq!(out.headers[header::CONTENT_TYPE], "application/json");
        let OutboundBody::Stream(body) = out.body else {
            panic!("expected a streamed body");
        };
        let bytes = axum::body::to_bytes(body, 1024).await.unwrap();
        assert_eq!(&bytes[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn multipart_put_is_reencoded() {
        let fx = Fixture::new();
        let body = "--abc\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n/data\r\n--abc--\r\n";
        let request = Request::put("/raw/upload")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=abc")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let out = Transform::Forward.apply(request, &fx.ctx()).await.unwrap();
        let OutboundBody::Multipart(entity) = out.body else {
            panic!("expected a multipart body");
        };
        assert_ne!(entity.boundary(), "abc");
        assert_eq!(out.headers[header::CONTENT_TYPE], entity.content_type().as_str());
        assert!(out.headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn session_cookie_is_injected() {
        let fx = Fixture::new();
        let ctx = TransformContext {
            session: Some(SessionCookie { name: "JSESSIONID", token: "s-1" }),
            ..fx.ctx()
        };
        let request = Request::delete("/raw/items/1").body(Body::empty()).unwrap();

        let out = Transform::Forward.apply(request, &ctx).await.unwrap();
        assert_eq!(out.method, Method::DELETE);
        assert_eq!(out.headers[header::COOKIE], "JSESSIONID=s-1");
    }

    #[tokio::test]
    async fn unsupported_methods_are_rejected() {
        let fx = Fixture::new();
        let request = Request::patch("/raw/items/1").body(Body::empty()).unwrap();
        let err = Transform::Forward.apply(request, &fx.ctx()).await.unwrap_err();
        assert!(matches!(err, ProxyError::MethodNotAllowed(Method::PATCH)));
    }

    #[tokio::test]
    async fn json_login_is_form_encoded() {
        let fx = Fixture::new();
        let request = Request::post("/raw/authn/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"a@b.org","password":"p w&"}"#))
            .unwrap();

        let out = Transform::JsonLogin.apply(request, &fx.ctx()).await.unwrap();
        assert_eq!(out.url, "http://backend.example/api/authn/login");
        assert_eq!(out.headers[header::CONTENT_TYPE], "application/x-www-form-urlencoded");
        let OutboundBody::Bytes(bytes) = out.body else {
            panic!("expected rewritten bytes");
        };
        assert_eq!(&bytes[..], b"user=a%40b.org&password=p+w%26");
    }

    #[tokio::test]
    async fn json_login_missing_field_is_bad_request() {
        let fx = Fixture::new();
        let request = Request::post("/raw/authn/login")
            .body(Body::from(r#"{"email":"a@b.org"}"#))
            .unwrap();

        let err = Transform::JsonLogin.apply(request, &fx.ctx()).await.unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(ref msg) if msg.contains("password")));
    }

    #[tokio::test]
    async fn json_login_rejects_bad_json_and_methods() {
        let fx = Fixture::new();
        let request = Request::post("/raw/authn/login").body(Body::from("nope")).unwrap();
        let err = Transform::JsonLogin.apply(request, &fx.ctx()).await.unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(_)));

        let request = Request::get("/raw/authn/login").body(Body::empty()).unwrap();
        let err = Transform::JsonLogin.apply(request, &fx.ctx()).await.unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(_)));
    }
}
