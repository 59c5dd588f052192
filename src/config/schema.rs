//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the repository proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Mounted backends. Each mount owns one forwarding engine.
    pub mounts: Vec<MountConfig>,

    /// Backend timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Multipart re-encoding limits.
    pub multipart: MultipartConfig,

    /// Session cookie handling.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A public path prefix forwarded onto one backend target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MountConfig {
    /// Mount identifier for logging/metrics.
    pub name: String,

    /// Public path prefix (e.g., "/raw").
    pub path: String,

    /// Backend base URL (e.g., "http://backend.example/api").
    pub target: String,

    /// Strip `path` from the inbound path before mapping onto the target.
    #[serde(default = "default_true")]
    pub strip_prefix: bool,

    /// Externally visible base URL used when rewriting redirects.
    /// Derived from the inbound request when absent; set it in deployments
    /// so clients cannot steer rewritten `Location` headers.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Honor `X-Forwarded-Proto`/`X-Forwarded-Host` when deriving the
    /// public base. Only for mounts behind a trusted proxy.
    #[serde(default)]
    pub trust_forwarded_headers: bool,

    /// How inbound requests are turned into backend requests.
    #[serde(default)]
    pub transform: TransformKind,

    /// Tie-breaker between mounts with equally long paths (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

fn default_true() -> bool {
    true
}

/// Request transform selected for a mount.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Forward the request as-is (multipart bodies are re-encoded).
    #[default]
    Forward,
    /// Reshape a JSON sign-in body into a form-encoded backend login.
    JsonLogin,
}

/// Timeout configuration for backend calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Maximum idle time between reads from the backend, in seconds.
    pub read_secs: u64,

    /// Write timeout in seconds: the longest pause allowed between
    /// uploaded body chunks, then the deadline for the response head.
    pub send_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            read_secs: 60,
            send_secs: 300,
            idle_secs: 90,
        }
    }
}

/// Multipart reconstruction limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MultipartConfig {
    /// Bytes kept in memory per part before spooling to disk.
    pub memory_threshold_bytes: usize,

    /// Directory for spooled parts. Defaults to the OS temp directory.
    pub spool_dir: Option<PathBuf>,

    /// Maximum number of parts accepted in one body.
    pub max_parts: usize,
}

impl MultipartConfig {
    /// Resolved spool directory.
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            memory_threshold_bytes: 5 * 1024 * 1024, // 5 MiB
            spool_dir: None,
            max_parts: 1000,
        }
    }
}

/// Session cookie handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inbound cookie carrying the caller's backend session token.
    /// No session is injected when absent.
    pub inbound_cookie: Option<String>,

    /// Cookie name the backend expects the session under.
    pub backend_cookie: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inbound_cookie: None,
            backend_cookie: "JSESSIONID".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
