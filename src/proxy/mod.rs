//! Forwarding engine subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → transform.rs (per-method builder)
//!         → target.rs (path rewrite)
//!         → headers.rs (header projection, session cookie)
//!         → multipart.rs (re-encode multipart bodies)
//!     → OutboundRequest
//!     → forwarder.rs (execute once, no redirect following)
//!     → redirect.rs (REDIRECT | NOT_MODIFIED | PASSTHROUGH | ERROR)
//!     → response.rs (stream body / empty redirect / empty 304)
//!     → client
//! ```
//!
//! # Design Decisions
//! - One engine per mount, parameterized by target, filter and session lookup
//! - Transform failures are values, and short-circuit before any backend call
//! - Nothing per-request outlives the request; engines are shared immutably

pub mod engine;
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod multipart;
pub mod redirect;
pub mod response;
pub mod session;
pub mod target;
pub mod transform;

pub use engine::ForwardingEngine;
pub use error::ProxyError;
pub use forwarder::{Forwarder, ProxyResponse};
pub use session::{CookieSession, NoSession, SessionLookup};
pub use target::{PathFilter, ProxyTarget};
pub use transform::{OutboundBody, OutboundRequest, Transform};
