//! Shared setup for gateway integration tests.

use std::sync::Arc;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::json;
use serde_json::value::RawValue;

use don_gateway::api::{Request, Response};
use don_gateway::config::{DonConfig, GatewayConfig, HandlerConfig, NodeConfig};
use don_gateway::connector::{ConnectorConfig, ConnectorHandler, GatewayConnector, GatewaySender};
use don_gateway::handlers::DefaultHandlerFactory;
use don_gateway::observability::PrometheusMetrics;
use don_gateway::Gateway;

/// Well-known development keys.
pub const NODE_KEYS: [&str; 3] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

pub const USER_KEY: &str = "7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6";

/// Routing key of the DON whose nodes echo requests back.
pub const ECHO_DON: &str = "echo_don";

/// Routing key of the DON whose node never answers.
pub const SILENT_DON: &str = "silent_don";

pub fn signer(key: &str) -> PrivateKeySigner {
    key.parse().unwrap()
}

pub fn address(key: &str) -> String {
    signer(key).address().to_string().to_lowercase()
}

fn don(don_id: &str, service_name: &str, keys: &[&str]) -> DonConfig {
    DonConfig {
        don_id: don_id.to_string(),
        handlers: vec![HandlerConfig {
            name: "dummy".to_string(),
            service_name: service_name.to_string(),
            config: json!({ "methods": [format!("{}.ping", service_name)] }),
        }],
        members: keys
            .iter()
            .enumerate()
            .map(|(i, key)| NodeConfig {
                name: format!("node-{}", i),
                address: address(key),
            })
            .collect(),
        ..DonConfig::default()
    }
}

/// Two DONs on ephemeral ports: `echo` served by nodes 0 and 1, `silent` by node 2.
pub fn test_config(request_timeout_ms: u64) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.user_server.bind_address = "127.0.0.1:0".to_string();
    config.user_server.request_timeout_ms = request_timeout_ms;
    config.user_server.shutdown_timeout_ms = 500;
    config.node_server.bind_address = "127.0.0.1:0".to_string();
    config.node_server.shutdown_timeout_ms = 500;
    config.dons = vec![
        don(ECHO_DON, "echo", &NODE_KEYS[..2]),
        don(SILENT_DON, "silent", &NODE_KEYS[2..]),
    ];
    config
}

pub async fn start_gateway(config: &GatewayConfig) -> Gateway {
    let gateway = Gateway::from_config(config, &DefaultHandlerFactory, Arc::new(PrometheusMetrics)).unwrap();
    gateway.start().await.unwrap();
    gateway
}

pub fn user_url(gateway: &Gateway) -> String {
    format!("http://127.0.0.1:{}/", gateway.user_port().unwrap())
}

/// Node that answers every request with its own params.
pub struct EchoNode;

#[async_trait]
impl ConnectorHandler for EchoNode {
    async fn handle_gateway_message(&self, request: Request, sender: GatewaySender) {
        let result = request
            .params
            .unwrap_or_else(|| RawValue::from_string("null".to_string()).unwrap());
        let _ = sender
            .send_response(&Response::success(request.id, request.method, result))
            .await;
    }
}

/// Node that accepts requests and never answers.
pub struct SilentNode;

#[async_trait]
impl ConnectorHandler for SilentNode {
    async fn handle_gateway_message(&self, _request: Request, _sender: GatewaySender) {}
}

pub async fn connect_node(
    gateway: &Gateway,
    config: &GatewayConfig,
    routing_key: &str,
    key: &str,
    handler: Arc<dyn ConnectorHandler>,
) -> GatewayConnector {
    let connector = GatewayConnector::new(
        ConnectorConfig {
            gateway_url: format!("ws://127.0.0.1:{}{}", gateway.node_port().unwrap(), config.node_server.path),
            gateway_id: config.gateway_id.clone(),
            routing_key: routing_key.to_string(),
            base_backoff_ms: 20,
            max_backoff_ms: 200,
        },
        signer(key),
        handler,
    )
    .unwrap();
    connector.start().unwrap();
    assert!(connector.wait_connected(Duration::from_secs(5)).await);
    connector
}

/// Wait until the gateway has registered `count` sessions for `routing_key`.
pub async fn wait_for_nodes(gateway: &Gateway, routing_key: &str, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while gateway.connected_nodes(routing_key).len() < count {
        assert!(tokio::time::Instant::now() < deadline, "nodes did not connect");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
