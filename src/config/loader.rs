//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Override the listener address and re-run validation.
pub fn with_bind_address(mut config: ProxyConfig, bind: String) -> Result<ProxyConfig, ConfigError> {
    config.listener.bind_address = bind;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [[mounts]]
            name = "raw"
            path = "/raw"
            target = "http://backend.example/api"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.mounts[0].target, "http://backend.example/api");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/repo-proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = parse_config("mounts = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn semantic_errors_are_reported() {
        let err = parse_config("").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().starts_with("Validation failed: "));
    }

    #[test]
    fn bind_override_is_validated() {
        let config = parse_config(
            r#"
            [[mounts]]
            name = "raw"
            path = "/raw"
            target = "http://backend.example/api"
            "#,
        )
        .unwrap();

        let ok = with_bind_address(config.clone(), "127.0.0.1:7000".into()).unwrap();
        assert_eq!(ok.listener.bind_address, "127.0.0.1:7000");

        let err = with_bind_address(config, "not-an-address".into()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors)
            if errors == &[ValidationError::InvalidBindAddress("not-an-address".into())]));
    }
}
