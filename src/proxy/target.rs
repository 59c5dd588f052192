//! Backend target addressing and path rewriting.
//!
//! # Responsibilities
//! - Hold the immutable backend address (scheme, host, port, base path)
//! - Apply the mount's path filter to inbound paths
//! - Join base path and filtered path into one normalized outbound path

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use url::Url;

/// Errors raised while parsing a target URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,
}

/// Backend address every inbound path is mapped onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    scheme: String,
    host: String,
    port: Option<u16>,
    base_path: String,
}

impl ProxyTarget {
    /// Parse an absolute `http`/`https` URL.
    ///
    /// The port is retained only when it differs from the scheme's default.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let url = Url::parse(raw)?;
        let scheme = url.scheme().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(TargetError::UnsupportedScheme(scheme));
        }
        let host = url.host_str().ok_or(TargetError::MissingHost)?.to_string();

        Ok(Self {
            scheme,
            host,
            port: url.port(),
            base_path: normalize_path(&[url.path()]),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Normalized base path, `/` when the target has none.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `host[:port]`, the value sent as the outbound `Host` header.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// `scheme://authority/base/path` without a trailing slash.
    pub fn base_url(&self) -> String {
        let path = if self.base_path == "/" { "" } else { self.base_path.as_str() };
        format!("{}://{}{}", self.scheme, self.authority(), path)
    }

    /// Full outbound URL for an already rewritten path and the verbatim query.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => {
                format!("{}://{}{}?{}", self.scheme, self.authority(), path, q)
            }
            _ => format!("{}://{}{}", self.scheme, self.authority(), path),
        }
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// Pure path-to-path transformation applied before mapping onto the target.
#[derive(Clone)]
pub struct PathFilter(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl PathFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Leaves the path untouched.
    pub fn identity() -> Self {
        Self::new(|path| path.to_string())
    }

    /// Removes a leading mount prefix. Matching is segment-aware, so
    /// `/raw` strips `/raw/x` but leaves `/rawdata` alone.
    pub fn strip_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self::new(move |path| {
            if prefix.is_empty() {
                return path.to_string();
            }
            match path.strip_prefix(prefix.as_str()) {
                Some("") => "/".to_string(),
                Some(rest) if rest.starts_with('/') => rest.to_string(),
                _ => path.to_string(),
            }
        })
    }

    pub fn apply(&self, path: &str) -> String {
        (self.0)(path)
    }
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PathFilter(..)")
    }
}

/// Map an inbound path onto the target: `normalize(base_path + filter(path))`.
pub fn rewrite_path(inbound_path: &str, target: &ProxyTarget, filter: &PathFilter) -> String {
    let filtered = filter.apply(inbound_path);
    normalize_path(&[target.base_path(), &filtered])
}

/// Join path pieces, dropping empty segments. Always starts with exactly one `/`.
fn normalize_path(pieces: &[&str]) -> String {
    let segments: Vec<&str> = pieces
        .iter()
        .flat_map(|piece| piece.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str) -> ProxyTarget {
        ProxyTarget::parse(url).unwrap()
    }

    #[test]
    fn strips_mount_prefix_onto_base() {
        let t = target("http://backend.example/api");
        let filter = PathFilter::strip_prefix("/raw");
        let path = rewrite_path("/raw/submission/S-TEST", &t, &filter);
        assert_eq!(path, "/api/submission/S-TEST");
        assert_eq!(
            t.url_for(&path, None),
            "http://backend.example/api/submission/S-TEST"
        );
    }

    #[test]
    fn collapses_empty_segments() {
        let t = target("http://backend.example//api//v1/");
        let path = rewrite_path("//items///3//", &t, &PathFilter::identity());
        assert_eq!(path, "/api/v1/items/3");
    }

    #[test]
    fn rewritten_paths_are_normalized() {
        let bases = ["http://h", "http://h/", "http://h/a", "http://h//a//b/"];
        let paths = ["", "/", "//", "/x", "x/y", "/x//y/", "///"];
        let filters = [
            PathFilter::identity(),
            PathFilter::strip_prefix("/x"),
            PathFilter::new(|p| format!("//{}//", p)),
        ];

        for base in bases {
            let t = target(base);
            for path in paths {
                for filter in &filters {
                    let out = rewrite_path(path, &t, filter);
                    assert!(out.starts_with('/'), "{out}");
                    assert!(!out.contains("//"), "{out}");
                    assert!(out == "/" || !out.ends_with('/'), "{out}");
                }
            }
        }
    }

    #[test]
    fn strip_prefix_is_segment_aware() {
        let filter = PathFilter::strip_prefix("/raw/");
        assert_eq!(filter.apply("/raw"), "/");
        assert_eq!(filter.apply("/raw/a"), "/a");
        assert_eq!(filter.apply("/rawdata"), "/rawdata");
        assert_eq!(filter.apply("/other"), "/other");
    }

    #[test]
    fn query_is_passed_verbatim() {
        let t = target("https://backend.example:8443/api");
        assert_eq!(
            t.url_for("/api/search", Some("q=a%20b&page=2")),
            "https://backend.example:8443/api/search?q=a%20b&page=2"
        );
        assert_eq!(t.url_for("/api", Some("")), "https://backend.example:8443/api");
    }

    #[test]
    fn default_port_is_dropped() {
        let t = target("http://backend.example:80/api/");
        assert_eq!(t.port(), None);
        assert_eq!(t.authority(), "backend.example");
        assert_eq!(t.base_url(), "http://backend.example/api");

        let t = target("http://backend.example:8080");
        assert_eq!(t.authority(), "backend.example:8080");
        assert_eq!(t.base_url(), "http://backend.example:8080");
    }

    #[test]
    fn rejects_non_http_targets() {
        assert_eq!(
            ProxyTarget::parse("ftp://backend.example/api"),
            Err(TargetError::UnsupportedScheme("ftp".into()))
        );
        assert!(ProxyTarget::parse("/relative").is_err());
    }
}
