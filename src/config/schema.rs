//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity nodes sign against during the handshake.
    pub gateway_id: String,

    /// User-facing HTTP server.
    pub user_server: UserServerConfig,

    /// Websocket endpoint nodes connect to.
    pub node_server: NodeServerConfig,

    pub connection_manager: ConnectionManagerConfig,

    /// One entry per routing key.
    pub dons: Vec<DonConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_id: "gateway".to_string(),
            user_server: UserServerConfig::default(),
            node_server: NodeServerConfig::default(),
            connection_manager: ConnectionManagerConfig::default(),
            dons: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// User HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UserServerConfig {
    /// Bind address (e.g., "0.0.0.0:5002"). Port 0 picks an ephemeral port.
    pub bind_address: String,

    /// Path accepting POSTed JSON-RPC requests.
    pub path: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    pub max_request_bytes: usize,

    /// Per-request deadline handed to the gateway.
    pub request_timeout_ms: u64,

    /// Grace period for in-flight requests on close.
    pub shutdown_timeout_ms: u64,
}

impl Default for UserServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5002".to_string(),
            path: "/".to_string(),
            tls: None,
            max_request_bytes: 100_000,
            request_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Node websocket server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeServerConfig {
    pub bind_address: String,

    pub path: String,

    pub tls: Option<TlsConfig>,

    /// Largest websocket message accepted from a node.
    pub max_message_bytes: usize,

    pub shutdown_timeout_ms: u64,
}

impl Default for NodeServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5003".to_string(),
            path: "/node".to_string(),
            tls: None,
            max_message_bytes: 1_000_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// TLS configuration for a listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Node session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionManagerConfig {
    /// Accepted clock skew of the handshake timestamp.
    pub auth_timestamp_tolerance_secs: u64,

    /// Interval between websocket pings.
    pub heartbeat_interval_secs: u64,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            auth_timestamp_tolerance_secs: 30,
            heartbeat_interval_secs: 10,
        }
    }
}

/// A DON: the routing key, its handlers and its member nodes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DonConfig {
    /// Routing key.
    pub don_id: String,

    /// Single-handler form, kept for older configs.
    pub handler_name: String,

    pub handler_config: serde_json::Value,

    pub handlers: Vec<HandlerConfig>,

    pub members: Vec<NodeConfig>,
}

impl DonConfig {
    /// Effective handler list: the single-handler form first, then `handlers`.
    pub fn handler_configs(&self) -> Vec<HandlerConfig> {
        let mut configs = Vec::with_capacity(self.handlers.len() + 1);
        if !self.handler_name.is_empty() {
            configs.push(HandlerConfig {
                name: self.handler_name.clone(),
                service_name: String::new(),
                config: self.handler_config.clone(),
            });
        }
        configs.extend(self.handlers.iter().cloned());
        configs
    }
}

/// One handler of a DON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HandlerConfig {
    /// Handler type known to the factory.
    pub name: String,

    /// Service name routing new-style requests (`<service>.<method>`).
    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub config: serde_json::Value,
}

/// A DON member node.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub name: String,

    /// Hex-encoded 20-byte address.
    pub address: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
