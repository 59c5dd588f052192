//! Mount lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled mounts
//! - Look up the mount owning a request path
//! - Return the matched engine or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix wins, priority breaks ties
//! - O(n) prefix scan (acceptable for typical mount counts)

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::config::ProxyConfig;
use crate::proxy::{ForwardingEngine, ProxyError};
use crate::routing::matcher::{Matcher, PathPrefixMatcher};

/// A compiled mount: prefix matcher plus its forwarding engine.
#[derive(Debug, Clone)]
pub struct Mount {
    matcher: PathPrefixMatcher,
    priority: u32,
    engine: Arc<ForwardingEngine>,
}

impl Mount {
    pub fn new(prefix: impl Into<String>, priority: u32, engine: ForwardingEngine) -> Self {
        Self {
            matcher: PathPrefixMatcher::new(prefix),
            priority,
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &Arc<ForwardingEngine> {
        &self.engine
    }
}

/// Immutable mount table.
#[derive(Debug, Default)]
pub struct Router {
    mounts: Vec<Mount>,
}

impl Router {
    /// Compile mounts, most specific first.
    pub fn new(mut mounts: Vec<Mount>) -> Self {
        mounts.sort_by(|a, b| {
            b.matcher
                .prefix()
                .len()
                .cmp(&a.matcher.prefix().len())
                .then(b.priority.cmp(&a.priority))
        });
        Self { mounts }
    }

    /// Build one engine per configured mount.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let mut mounts = Vec::with_capacity(config.mounts.len());
        for mount in &config.mounts {
            let engine = ForwardingEngine::from_mount(mount, config)?;
            tracing::info!(
                mount = %mount.name,
                path = %mount.path,
                target = %engine.target(),
                transform = ?mount.transform,
                "Mount registered"
            );
            mounts.push(Mount::new(mount.path.clone(), mount.priority, engine));
        }
        Ok(Self::new(mounts))
    }

    /// Find the engine for a request.
    pub fn match_request(&self, req: &Request<Body>) -> Option<Arc<ForwardingEngine>> {
        self.mounts
            .iter()
            .find(|mount| mount.matcher.matches(req))
            .map(|mount| Arc::clone(&mount.engine))
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
