//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Multipart, Request};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use repo_proxy::config::parse_config;
use repo_proxy::{HttpServer, Shutdown};

/// What a stub backend saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One part as a stub backend decoded it.
#[derive(Debug, Clone)]
pub struct RecordedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    pub parts: Arc<Mutex<Vec<RecordedPart>>>,
}

impl Recorder {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn parts(&self) -> Vec<RecordedPart> {
        self.parts.lock().unwrap().clone()
    }
}

/// Bind an ephemeral local listener.
pub async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let (listener, addr) = bind_local().await;
    drop(listener);
    addr
}

/// Start an axum backend that records every request and answers
/// `200 ok from backend`. `POST .../upload` decodes multipart parts too.
pub async fn start_recording_backend() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let (listener, addr) = bind_local().await;

    let fallback_recorder = recorder.clone();
    let upload_recorder = recorder.clone();
    let app = axum::Router::new()
        .route(
            "/store/upload",
            post(move |headers: HeaderMap, multipart: Multipart| {
                record_upload(upload_recorder.clone(), headers, multipart)
            }),
        )
        .fallback(move |request: Request| record(fallback_recorder.clone(), request));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, recorder)
}

async fn record(recorder: Recorder, request: Request) -> (StatusCode, &'static str) {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    recorder.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_default(),
        headers: parts.headers,
        body,
    });
    (StatusCode::OK, "ok from backend")
}

async fn record_upload(
    recorder: Recorder,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, &'static str) {
    recorder.requests.lock().unwrap().push(RecordedRequest {
        method: "POST".to_string(),
        path_and_query: "/store/upload".to_string(),
        headers,
        body: Bytes::new(),
    });
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap();
        recorder.parts.lock().unwrap().push(RecordedPart {
            name,
            file_name,
            data,
        });
    }
    (StatusCode::CREATED, "stored")
}

/// Start a raw TCP backend whose reply is computed from the request head.
/// Each reply must be a complete HTTP/1.1 response.
pub async fn start_programmable_backend<F, Fut>(listener: TcpListener, f: F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
{
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let response = f(head).await;
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let (listener, addr) = bind_local().await;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Start the proxy from TOML text on an ephemeral port.
pub async fn start_proxy(config_toml: &str) -> (SocketAddr, Shutdown) {
    let config = parse_config(config_toml).unwrap();
    let server = HttpServer::new(&config).unwrap();
    let (listener, addr) = bind_local().await;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}

/// Client that never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
