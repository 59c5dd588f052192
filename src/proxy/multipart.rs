//! Multipart reconstruction.
//!
//! # Responsibilities
//! - Parse an inbound `multipart/form-data` body into ordered parts
//! - Keep small parts in memory, spool large ones to anonymous temp files
//! - Re-encode the parts under a freshly generated boundary
//!
//! # Design Decisions
//! - The client's boundary never leaves the proxy
//! - Spool files are unlinked on creation, so dropping the handle is cleanup
//! - Content-Length of the re-encoded entity is known before sending

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use futures_util::{future, stream, Stream, StreamExt};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::config::MultipartConfig;
use crate::observability::metrics;
use crate::proxy::error::ProxyError;

const SPOOL_READ_CAPACITY: usize = 64 * 1024;

/// Stream of encoded entity bytes.
pub type EntityStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Whether a part carries a plain value or an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    Text,
    File { filename: String },
}

/// Part content, in memory or spooled to disk.
#[derive(Debug)]
pub enum PartBody {
    Memory(Bytes),
    Spooled { file: tokio::fs::File, len: u64 },
}

impl PartBody {
    pub fn len(&self) -> u64 {
        match self {
            PartBody::Memory(bytes) => bytes.len() as u64,
            PartBody::Spooled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One field of a multipart body.
#[derive(Debug)]
pub struct Part {
    field_name: String,
    kind: PartKind,
    content_type: Option<String>,
    body: PartBody,
}

impl Part {
    pub fn text(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            kind: PartKind::Text,
            content_type: None,
            body: PartBody::Memory(Bytes::from(value.into())),
        }
    }

    pub fn file(
        field_name: impl Into<String>,
        filename: impl Into<String>,
        content_type: Option<String>,
        body: PartBody,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            kind: PartKind::File { filename: filename.into() },
            content_type,
            body,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> &PartBody {
        &self.body
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self.body, PartBody::Spooled { .. })
    }

    /// Text value, when the part is a text field held in memory.
    pub fn text_value(&self) -> Option<&str> {
        match (&self.kind, &self.body) {
            (PartKind::Text, PartBody::Memory(bytes)) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    fn memory_contains(&self, needle: &[u8]) -> bool {
        match &self.body {
            PartBody::Memory(bytes) => bytes.windows(needle.len()).any(|w| w == needle),
            PartBody::Spooled { .. } => false,
        }
    }

    fn header_block(&self, boundary: &str) -> Bytes {
        let mut head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            boundary,
            escape_quoted(&self.field_name)
        );
        if let PartKind::File { filename } = &self.kind {
            head.push_str(&format!("; filename=\"{}\"", escape_quoted(filename)));
        }
        head.push_str("\r\n");
        let content_type = match (&self.kind, &self.content_type) {
            (_, Some(ct)) => Some(ct.as_str()),
            (PartKind::File { .. }, None) => Some("application/octet-stream"),
            (PartKind::Text, None) => None,
        };
        if let Some(ct) = content_type {
            head.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        head.push_str("\r\n");
        Bytes::from(head)
    }
}

/// A re-encoded multipart body ready to send.
pub struct MultipartEntity {
    boundary: String,
    segments: Vec<Segment>,
    content_length: u64,
}

enum Segment {
    Bytes(Bytes),
    File(tokio::fs::File),
}

impl MultipartEntity {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `multipart/form-data; boundary=...` for the outbound request.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Stream the entity without materializing spooled parts.
    pub fn into_stream(self) -> EntityStream {
        Box::pin(stream::iter(self.segments).flat_map(|segment| -> EntityStream {
            match segment {
                Segment::Bytes(bytes) => Box::pin(stream::once(future::ready(Ok(bytes)))),
                Segment::File(file) => {
                    Box::pin(ReaderStream::with_capacity(file, SPOOL_READ_CAPACITY))
                }
            }
        }))
    }
}

impl std::fmt::Debug for MultipartEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartEntity")
            .field("boundary", &self.boundary)
            .field("segments", &self.segments.len())
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// True when the headers declare a `multipart/form-data` body.
pub fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("multipart/form-data"))
        .unwrap_or(false)
}

/// Parse the inbound body and re-encode it under a fresh boundary.
pub async fn reconstruct(
    body: Body,
    content_type: &str,
    config: &MultipartConfig,
) -> Result<MultipartEntity, ProxyError> {
    let inbound_boundary = multer::parse_boundary(content_type)?;
    let parts = parse_parts(body, &inbound_boundary, config).await?;
    Ok(encode(parts, &inbound_boundary))
}

/// Parse an inbound multipart stream into ordered parts.
pub async fn parse_parts(
    body: Body,
    boundary: &str,
    config: &MultipartConfig,
) -> Result<Vec<Part>, ProxyError> {
    let mut multipart = multer::Multipart::new(body.into_data_stream(), boundary);
    let spool_dir = config.spool_dir();
    let mut parts = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        if parts.len() >= config.max_parts {
            return Err(ProxyError::MultipartParse(format!(
                "more than {} parts",
                config.max_parts
            )));
        }

        let field_name = field
            .name()
            .map(str::to_string)
            .ok_or_else(|| ProxyError::MultipartParse("part without a field name".into()))?;
        let kind = match field.file_name() {
            Some(filename) => PartKind::File { filename: filename.to_string() },
            None => PartKind::Text,
        };
        let content_type = field.content_type().map(|mime| mime.to_string());
        let body = read_part(&mut field, config.memory_threshold_bytes, &spool_dir).await?;

        tracing::trace!(
            field = %field_name,
            bytes = body.len(),
            spooled = matches!(body, PartBody::Spooled { .. }),
            "Multipart part read"
        );

        parts.push(Part { field_name, kind, content_type, body });
    }

    Ok(parts)
}

/// Encode parts under a boundary that differs from `inbound_boundary`.
pub fn encode(parts: Vec<Part>, inbound_boundary: &str) -> MultipartEntity {
    let boundary = fresh_boundary(inbound_boundary, &parts);
    let crlf = Bytes::from_static(b"\r\n");

    let mut segments = Vec::with_capacity(parts.len() * 3 + 1);
    let mut content_length = 0u64;

    for part in parts {
        let head = part.header_block(&boundary);
        content_length += head.len() as u64 + part.body.len() + crlf.len() as u64;
        segments.push(Segment::Bytes(head));
        match part.body {
            PartBody::Memory(bytes) => segments.push(Segment::Bytes(bytes)),
            PartBody::Spooled { file, .. } => segments.push(Segment::File(file)),
        }
        segments.push(Segment::Bytes(crlf.clone()));
    }

    let closing = Bytes::from(format!("--{}--\r\n", boundary));
    content_length += closing.len() as u64;
    segments.push(Segment::Bytes(closing));

    MultipartEntity { boundary, segments, content_length }
}

fn fresh_boundary(inbound_boundary: &str, parts: &[Part]) -> String {
    loop {
        let candidate = format!("RepoProxyBoundary{}", Uuid::new_v4().simple());
        let collides = candidate == inbound_boundary
            || parts.iter().any(|p| p.memory_contains(candidate.as_bytes()));
        if !collides {
            return candidate;
        }
    }
}

async fn read_part(
    field: &mut multer::Field<'_>,
    threshold: usize,
    spool_dir: &Path,
) -> Result<PartBody, ProxyError> {
    let mut buffer = BytesMut::new();
    let mut spool: Option<(tokio::fs::File, u64)> = None;

    while let Some(chunk) = field.chunk().await? {
        match spool.as_mut() {
            Some((file, len)) => {
                file.write_all(&chunk).await.map_err(ProxyError::Spool)?;
                *len += chunk.len() as u64;
            }
            None if buffer.len() + chunk.len() > threshold => {
                let mut file = spool_file(spool_dir.to_path_buf()).await?;
                file.write_all(&buffer).await.map_err(ProxyError::Spool)?;
                file.write_all(&chunk).await.map_err(ProxyError::Spool)?;
                let len = (buffer.len() + chunk.len()) as u64;
                buffer = BytesMut::new();
                spool = Some((file, len));
                metrics::record_spooled_part();
            }
            None => buffer.extend_from_slice(&chunk),
        }
    }

    match spool {
        Some((mut file, len)) => {
            file.flush().await.map_err(ProxyError::Spool)?;
            file.seek(SeekFrom::Start(0)).await.map_err(ProxyError::Spool)?;
            Ok(PartBody::Spooled { file, len })
        }
        None => Ok(PartBody::Memory(buffer.freeze())),
    }
}

async fn spool_file(dir: PathBuf) -> Result<tokio::fs::File, ProxyError> {
    let file = tokio::task::spawn_blocking(move || tempfile::tempfile_in(dir))
        .await
        .map_err(|e| ProxyError::Spool(io::Error::other(e)))?
        .map_err(ProxyError::Spool)?;
    Ok(tokio::fs::File::from_std(file))
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
