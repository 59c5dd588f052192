//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → one ForwardingEngine per mount, built once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; targets never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, with_bind_address, ConfigError};
pub use schema::ProxyConfig;
pub use schema::ListenerConfig;
pub use schema::MountConfig;
pub use schema::{LogFormat, MultipartConfig, ObservabilityConfig, SessionConfig, TimeoutConfig, TransformKind};
