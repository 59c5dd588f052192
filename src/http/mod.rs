//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, catch-all handler)
//!     → request.rs (request ID, trace span)
//!     → [routing picks the mount]
//!     → [forwarding engine talks to the backend]
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
