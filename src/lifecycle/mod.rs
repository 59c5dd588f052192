//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain in-flight requests → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then engines, then listeners
//! - In-flight forwards finish; their spool files go with them

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
