//! Backend executor.
//!
//! # Responsibilities
//! - Issue the outbound request exactly once, verb as requested
//! - Never follow redirects (they are rewritten, not chased)
//! - Enforce connect, read and send deadlines
//!
//! # Design Decisions
//! - No retries: a failed exchange surfaces as a transport error
//! - The send deadline is an idle bound while the body uploads, then a
//!   deadline on the response head; a slow upload that keeps moving is
//!   never cut off
//! - The returned response owns the backend connection; dropping it
//!   (or the future producing it) aborts the call and frees the connection

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::oneshot;
use tokio::time::{Instant, Sleep};

use crate::config::TimeoutConfig;
use crate::proxy::error::ProxyError;
use crate::proxy::transform::{OutboundBody, OutboundRequest};

/// Backend response: status, headers and a still-unread body.
#[derive(Debug)]
pub struct ProxyResponse {
    inner: reqwest::Response,
}

impl ProxyResponse {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Consume the response into its body stream.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send {
        self.inner.bytes_stream()
    }
}

impl From<reqwest::Response> for ProxyResponse {
    fn from(inner: reqwest::Response) -> Self {
        Self { inner }
    }
}

/// Executes outbound requests against the backend.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    send_timeout: Duration,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeouts.connect())
            .read_timeout(timeouts.read())
            .pool_idle_timeout(timeouts.idle())
            .no_proxy()
            .build()
            .map_err(ProxyError::Transport)?;

        Ok(Self {
            client,
            send_timeout: timeouts.send(),
        })
    }

    /// Send the request and wait for the response head.
    pub async fn execute(&self, request: OutboundRequest) -> Result<ProxyResponse, ProxyError> {
        let OutboundRequest { method, url, mut headers, body } = request;
        let stalled = Arc::new(AtomicBool::new(false));

        let (body, uploaded) = match body {
            OutboundBody::Empty => (None, None),
            OutboundBody::Bytes(bytes) => (Some(reqwest::Body::from(bytes)), None),
            OutboundBody::Stream(body) => {
                let (upload, done) =
                    WriteDeadline::new(body.into_data_stream(), self.send_timeout, &stalled);
                (Some(reqwest::Body::wrap_stream(upload)), Some(done))
            }
            OutboundBody::Multipart(entity) => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(entity.content_length()));
                let (upload, done) =
                    WriteDeadline::new(entity.into_stream(), self.send_timeout, &stalled);
                (Some(reqwest::Body::wrap_stream(upload)), Some(done))
            }
        };

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let send = builder.send();
        tokio::pin!(send);

        // Streamed bodies are bounded chunk by chunk; the head deadline
        // starts once the last chunk is handed over.
        if let Some(uploaded) = uploaded {
            tokio::select! {
                result = &mut send => return self.finish(result, &stalled),
                _ = uploaded => {}
            }
        }

        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => self.finish(result, &stalled),
            Err(_) => Err(ProxyError::Timeout(self.send_timeout)),
        }
    }

    fn finish(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
        stalled: &AtomicBool,
    ) -> Result<ProxyResponse, ProxyError> {
        match result {
            Ok(inner) => Ok(ProxyResponse { inner }),
            Err(_) if stalled.load(Ordering::Acquire) => Err(ProxyError::Timeout(self.send_timeout)),
            Err(e) => Err(ProxyError::Transport(e)),
        }
    }
}

/// Outbound body that fails when no chunk arrives within `idle`, and
/// reports completion once the last chunk has been taken.
struct WriteDeadline<S> {
    inner: Pin<Box<S>>,
    idle: Duration,
    sleep: Pin<Box<Sleep>>,
    done: Option<oneshot::Sender<()>>,
    stalled: Arc<AtomicBool>,
}

impl<S> WriteDeadline<S> {
    fn new(inner: S, idle: Duration, stalled: &Arc<AtomicBool>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let upload = Self {
            inner: Box::pin(inner),
            idle,
            sleep: Box::pin(tokio::time::sleep(idle)),
            done: Some(tx),
            stalled: Arc::clone(stalled),
        };
        (upload, rx)
    }
}

impl<S, E> Stream for WriteDeadline<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let deadline = Instant::now() + this.idle;
                this.sleep.as_mut().reset(deadline);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e)))),
            Poll::Ready(None) => {
                if let Some(done) = this.done.take() {
                    let _ = done.send(());
                }
                Poll::Ready(None)
            }
            Poll::Pending => match this.sleep.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.stalled.store(true, Ordering::Release);
                    Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "request body stalled",
                    ))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
