//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (mount lookup)
//!     → matcher.rs (segment-aware prefix check)
//!     → Return: matched ForwardingEngine or NoMatch
//!
//! Mount Compilation (at startup):
//!     MountConfig[]
//!     → Build one ForwardingEngine each
//!     → Sort by prefix length, then priority
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Mounts compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same mount

pub mod matcher;
pub mod router;

pub use router::{Mount, Router};
