//! Forwarding engine: one per mount, immutable after construction.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};

use crate::config::{MountConfig, MultipartConfig, ProxyConfig};
use crate::observability::metrics;
use crate::proxy::error::ProxyError;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::headers::SessionCookie;
use crate::proxy::redirect::{self, Disposition};
use crate::proxy::response;
use crate::proxy::session::{CookieSession, NoSession, SessionLookup};
use crate::proxy::target::{PathFilter, ProxyTarget};
use crate::proxy::transform::{Transform, TransformContext};

/// Forwards requests for one mount onto one backend target.
pub struct ForwardingEngine {
    name: String,
    context_path: String,
    target: ProxyTarget,
    filter: PathFilter,
    sessions: Arc<dyn SessionLookup>,
    session_cookie: String,
    transform: Transform,
    forwarder: Forwarder,
    multipart: MultipartConfig,
    public_url: Option<String>,
    trust_forwarded: bool,
}

impl std::fmt::Debug for ForwardingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingEngine")
            .field("name", &self.name)
            .field("context_path", &self.context_path)
            .field("target", &self.target)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

impl ForwardingEngine {
    pub fn builder(target: ProxyTarget) -> ForwardingEngineBuilder {
        ForwardingEngineBuilder::new(target)
    }

    /// Build the engine for a configured mount.
    pub fn from_mount(mount: &MountConfig, config: &ProxyConfig) -> Result<Self, ProxyError> {
        let target = ProxyTarget::parse(&mount.target)
            .map_err(|e| ProxyError::InvalidOutbound(format!("mount '{}': {}", mount.name, e)))?;

        let filter = if mount.strip_prefix {
            PathFilter::strip_prefix(mount.path.clone())
        } else {
            PathFilter::identity()
        };

        let sessions: Arc<dyn SessionLookup> = match &config.session.inbound_cookie {
            Some(cookie) => Arc::new(CookieSession::new(cookie.clone())),
            None => Arc::new(NoSession),
        };

        let mut builder = ForwardingEngine::builder(target)
            .name(mount.name.clone())
            .context_path(if mount.strip_prefix { mount.path.clone() } else { String::new() })
            .filter(filter)
            .sessions(sessions)
            .session_cookie(config.session.backend_cookie.clone())
            .transform(mount.transform.into())
            .multipart(config.multipart.clone());
        if let Some(public_url) = &mount.public_url {
            builder = builder.public_url(public_url.clone());
        }
        if mount.trust_forwarded_headers {
            builder = builder.trust_forwarded_headers(true);
        }
        Ok(builder.build(Forwarder::new(&config.timeouts)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public path prefix the backend paths appear under.
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    /// Forward one request, converting every failure into a client response.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let public_base = self.public_base(&request);

        let response = match self.forward(request, &public_base).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_client_error() {
                    tracing::warn!(
                        mount = %self.name,
                        method = %method,
                        path = %path,
                        target = %self.target,
                        kind = e.kind(),
                        error = %e,
                        "Request rejected"
                    );
                } else {
                    tracing::error!(
                        mount = %self.name,
                        method = %method,
                        path = %path,
                        target = %self.target,
                        kind = e.kind(),
                        error = %e,
                        "Forwarding failed"
                    );
                }
                e.into_response()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), &self.name, start);
        response
    }

    /// Transform, execute, then redirect-handle or stream.
    pub async fn forward(
        &self,
        request: Request<Body>,
        public_base: &str,
    ) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let token = self.sessions.session_token(&parts);
        let ctx = TransformContext {
            target: &self.target,
            filter: &self.filter,
            session: token.as_deref().map(|token| SessionCookie {
                name: &self.session_cookie,
                token,
            }),
            multipart: &self.multipart,
        };

        let outbound = self
            .transform
            .apply(Request::from_parts(parts, body), &ctx)
            .await?;

        tracing::debug!(
            mount = %self.name,
            method = %outbound.method,
            url = %outbound.url,
            "Forwarding to backend"
        );

        let backend = self.forwarder.execute(outbound).await?;
        let status = backend.status();

        match redirect::classify(status, backend.headers())? {
            Disposition::Redirect(location) => {
                let rewritten = redirect::rewrite_location(&location, &self.target, public_base);
                tracing::debug!(
                    status = %status,
                    location = %location,
                    rewritten = %rewritten,
                    "Rewriting backend redirect"
                );
                response::redirect(backend, &rewritten)
            }
            Disposition::NotModified => Ok(response::not_modified(backend)),
            Disposition::Relocated(location) => {
                let rewritten = redirect::rewrite_location(&location, &self.target, public_base);
                response::relocate(backend, &rewritten)
            }
            Disposition::Passthrough => Ok(response::stream(backend)),
        }
    }

    /// Externally visible base URL of this mount for the given request.
    ///
    /// Without a configured `public_url` the base comes from request
    /// headers the client controls; `X-Forwarded-*` is only honored when
    /// the mount trusts the proxy in front of it.
    pub fn public_base(&self, request: &Request<Body>) -> String {
        if let Some(public_url) = &self.public_url {
            return public_url.trim_end_matches('/').to_string();
        }
        derive_public_base(
            request.headers(),
            request.uri(),
            &self.context_path,
            self.trust_forwarded,
        )
    }
}

/// `scheme://host[:port]/context` as the client addressed the proxy.
fn derive_public_base(
    headers: &axum::http::HeaderMap,
    uri: &axum::http::Uri,
    context_path: &str,
    trust_forwarded: bool,
) -> String {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let forwarded = |name: &str| header_str(name).filter(|_| trust_forwarded);

    let scheme = forwarded("x-forwarded-proto")
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());
    let host = forwarded("x-forwarded-host")
        .or_else(|| header_str(header::HOST.as_str()))
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    format!("{}://{}{}", scheme, host, context_path.trim_end_matches('/'))
}

/// Builder for [`ForwardingEngine`].
pub struct ForwardingEngineBuilder {
    target: ProxyTarget,
    name: String,
    context_path: String,
    filter: PathFilter,
    sessions: Arc<dyn SessionLookup>,
    session_cookie: String,
    transform: Transform,
    multipart: MultipartConfig,
    public_url: Option<String>,
    trust_forwarded: bool,
}

impl ForwardingEngineBuilder {
    fn new(target: ProxyTarget) -> Self {
        Self {
            target,
            name: "default".to_string(),
            context_path: String::new(),
            filter: PathFilter::identity(),
            sessions: Arc::new(NoSession),
            session_cookie: "JSESSIONID".to_string(),
            transform: Transform::Forward,
            multipart: MultipartConfig::default(),
            public_url: None,
            trust_forwarded: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into();
        self
    }

    pub fn filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionLookup>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    /// Honor `X-Forwarded-Proto`/`X-Forwarded-Host` when deriving the public base.
    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn build(self, forwarder: Forwarder) -> ForwardingEngine {
        ForwardingEngine {
            name: self.name,
            context_path: self.context_path,
            target: self.target,
            filter: self.filter,
            sessions: self.sessions,
            session_cookie: self.session_cookie,
            transform: self.transform,
            forwarder,
            multipart: self.multipart,
            public_url: self.public_url,
            trust_forwarded: self.trust_forwarded,
        }
    }
}
