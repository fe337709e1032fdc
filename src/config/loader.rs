//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
gateway_id = "gw-1"

[user_server]
bind_address = "127.0.0.1:0"
request_timeout_ms = 2000

[node_server]
bind_address = "127.0.0.1:0"

[[dons]]
don_id = "donA"
handler_name = "dummy"

[[dons.members]]
name = "node-1"
address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"

[[dons]]
don_id = "donB"

[[dons.handlers]]
name = "dummy"
service_name = "svcB"
config = { methods = ["svcB.get"], pending_timeout_ms = 500 }
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.gateway_id, "gw-1");
        assert_eq!(config.user_server.request_timeout_ms, 2000);
        assert_eq!(config.user_server.path, "/");
        assert_eq!(config.node_server.path, "/node");
        assert_eq!(config.dons.len(), 2);
        assert_eq!(config.dons[0].members.len(), 1);

        let handler = &config.dons[1].handlers[0];
        assert_eq!(handler.service_name, "svcB");
        assert_eq!(handler.config["methods"][0], "svcB.get");
        assert_eq!(handler.config["pending_timeout_ms"], 500);
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let config = parse_config("").unwrap();
        assert_eq!(config.gateway_id, "gateway");
        assert!(config.dons.is_empty());
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config("gateway_id = \"\"\n[user_server]\nrequest_timeout_ms = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: gateway_id: must not be empty, user_server.request_timeout_ms: must be positive"
        );
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse_config("dons = 5"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config(Path::new("/definitely/not/here.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
