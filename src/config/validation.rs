//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every mount has a usable target and public URL
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Detect conflicting mounts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::ProxyConfig;
use crate::proxy::target::ProxyTarget;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoMounts,
    InvalidTarget { mount: String, reason: String },
    InvalidPublicUrl { mount: String, reason: String },
    InvalidMountPath { mount: String, path: String },
    DuplicateMountPath(String),
    ZeroTimeout(&'static str),
    ZeroMemoryThreshold,
    ZeroMaxParts,
    InvalidBindAddress(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NoMounts => write!(f, "at least one mount is required"),
            ValidationError::InvalidTarget { mount, reason } => {
                write!(f, "mount '{}' has an invalid target: {}", mount, reason)
            }
            ValidationError::InvalidPublicUrl { mount, reason } => {
                write!(f, "mount '{}' has an invalid public_url: {}", mount, reason)
            }
            ValidationError::InvalidMountPath { mount, path } => {
                write!(f, "mount '{}' path '{}' must start with '/'", mount, path)
            }
            ValidationError::DuplicateMountPath(path) => {
                write!(f, "mount path '{}' is declared more than once", path)
            }
            ValidationError::ZeroTimeout(name) => write!(f, "timeouts.{} must be > 0", name),
            ValidationError::ZeroMemoryThreshold => {
                write!(f, "multipart.memory_threshold_bytes must be > 0")
            }
            ValidationError::ZeroMaxParts => write!(f, "multipart.max_parts must be > 0"),
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "listener.bind_address '{}' is not a socket address", addr)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config
        .listener
        .bind_address
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.mounts.is_empty() {
        errors.push(ValidationError::NoMounts);
    }

    let mut seen_paths = HashSet::new();
    for mount in &config.mounts {
        if let Err(e) = ProxyTarget::parse(&mount.target) {
            errors.push(ValidationError::InvalidTarget {
                mount: mount.name.clone(),
                reason: e.to_string(),
            });
        }

        if let Some(public_url) = &mount.public_url {
            if let Err(e) = ProxyTarget::parse(public_url) {
                errors.push(ValidationError::InvalidPublicUrl {
                    mount: mount.name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if !mount.path.starts_with('/') {
            errors.push(ValidationError::InvalidMountPath {
                mount: mount.name.clone(),
                path: mount.path.clone(),
            });
        }

        let normalized = mount.path.trim_end_matches('/').to_string();
        if !seen_paths.insert(normalized) {
            errors.push(ValidationError::DuplicateMountPath(mount.path.clone()));
        }
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("connect_secs", timeouts.connect_secs),
        ("read_secs", timeouts.read_secs),
        ("send_secs", timeouts.send_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.multipart.memory_threshold_bytes == 0 {
        errors.push(ValidationError::ZeroMemoryThreshold);
    }

    if config.multipart.max_parts == 0 {
        errors.push(ValidationError::ZeroMaxParts);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
