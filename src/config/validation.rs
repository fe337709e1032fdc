//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sizes > 0, addresses parse)
//! - Check DON declarations (routing key length, member addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Duplicate routing keys and service names are rejected when the gateway
//!   is built, where the same checks also cover programmatic configs

use std::fmt;
use std::net::SocketAddr;

use alloy::primitives::Address;

use crate::api::message::MESSAGE_ROUTING_KEY_MAX_LEN;
use crate::config::schema::{GatewayConfig, TlsConfig};

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a deserialized configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.gateway_id.is_empty() {
        errors.push(ValidationError::new("gateway_id", "must not be empty"));
    }

    let user = &config.user_server;
    check_bind("user_server", &user.bind_address, user.tls.as_ref(), &mut errors);
    check_positive("user_server.max_request_bytes", user.max_request_bytes as u64, &mut errors);
    check_positive("user_server.request_timeout_ms", user.request_timeout_ms, &mut errors);
    if !user.path.starts_with('/') {
        errors.push(ValidationError::new("user_server.path", "must start with '/'"));
    }

    let node = &config.node_server;
    check_bind("node_server", &node.bind_address, node.tls.as_ref(), &mut errors);
    check_positive("node_server.max_message_bytes", node.max_message_bytes as u64, &mut errors);
    if !node.path.starts_with('/') {
        errors.push(ValidationError::new("node_server.path", "must start with '/'"));
    }

    check_positive(
        "connection_manager.heartbeat_interval_secs",
        config.connection_manager.heartbeat_interval_secs,
        &mut errors,
    );

    for (i, don) in config.dons.iter().enumerate() {
        let prefix = format!("dons[{}]", i);
        if don.don_id.is_empty() || don.don_id.len() > MESSAGE_ROUTING_KEY_MAX_LEN {
            errors.push(ValidationError::new(
                format!("{}.don_id", prefix),
                format!("length must be between 1 and {}", MESSAGE_ROUTING_KEY_MAX_LEN),
            ));
        }
        if don.handler_configs().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.handlers", prefix),
                "at least one handler is required",
            ));
        }
        for (j, handler) in don.handlers.iter().enumerate() {
            if handler.name.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.handlers[{}].name", prefix, j),
                    "must not be empty",
                ));
            }
        }
        for (j, member) in don.members.iter().enumerate() {
            if member.address.parse::<Address>().is_err() {
                errors.push(ValidationError::new(
                    format!("{}.members[{}].address", prefix, j),
                    format!("invalid node address {:?}", member.address),
                ));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_bind(section: &str, bind: &str, tls: Option<&TlsConfig>, errors: &mut Vec<ValidationError>) {
    if bind.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            format!("{}.bind_address", section),
            format!("invalid socket address {:?}", bind),
        ));
    }
    if let Some(tls) = tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.tls", section),
                "cert_path and key_path are required",
            ));
        }
    }
}

fn check_positive(field: &str, value: u64, errors: &mut Vec<ValidationError>) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be positive"));
    }
}
