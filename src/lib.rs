//! Repository forwarding proxy library.
//!
//! Mounts public path prefixes onto backend repository services: rewrites
//! paths and headers, re-encodes multipart uploads, and relays responses
//! with redirect and 304 handling.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{ForwardingEngine, ProxyError};
