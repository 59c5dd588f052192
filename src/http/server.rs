//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener
//! - Dispatch requests to the mount's forwarding engine
//!
//! # Design Decisions
//! - No request-wide timeout layer; backend deadlines live in the forwarder
//!   so long uploads are not cut off at the edge
//! - Body limits disabled; multipart bodies spool to disk instead

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::request::{make_span, propagate_request_id_layer, request_id, set_request_id_layer};
use crate::observability::metrics;
use crate::proxy::ProxyError;
use crate::routing::Router as ProxyRouter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    mounts: usize,
}

impl HttpServer {
    /// Create a new HTTP server, building one engine per configured mount.
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let proxy_router = ProxyRouter::from_config(config)?;
        Ok(Self::with_router(proxy_router))
    }

    /// Create a server over an already compiled mount table.
    pub fn with_router(proxy_router: ProxyRouter) -> Self {
        let mounts = proxy_router.len();
        let state = AppState {
            router: Arc::new(proxy_router),
        };
        Self {
            router: Self::build_router(state),
            mounts,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The assembled Axum router, for in-process serving.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown channel fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mounts = self.mounts,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Looks up the mount and hands the request to its engine.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.router.match_request(&request) {
        Some(engine) => engine.handle(request).await,
        None => {
            let start = Instant::now();
            tracing::warn!(
                request_id = %request_id(&request),
                path = %request.uri().path(),
                "No mount matched"
            );
            metrics::record_request(request.method().as_str(), 404, "none", start);
            (StatusCode::NOT_FOUND, "No matching mount").into_response()
        }
    }
}
