//! Mount matching logic.
//!
//! # Responsibilities
//! - Match the request path against a mount prefix
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefixes match whole segments: `/raw` matches `/raw/x`, not `/rawdata`
//! - No regex to guarantee O(n) matching

use axum::http::Request;
use axum::body::Body;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Matches the request path prefix on segment boundaries.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher. A trailing slash is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Normalized prefix; empty for the root mount.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matches_path(req.uri().path())
    }
}
