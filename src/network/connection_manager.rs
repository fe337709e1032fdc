//! Node connection manager.
//!
//! # Responsibilities
//! - Serve the websocket endpoint nodes dial into
//! - Authenticate nodes against their DON's member list
//! - Keep one session per (routing key, node address)
//! - Route node responses to the DON's handler and requests to nodes
//!
//! # Design Decisions
//! - A newer session for the same node replaces the older one; dropping the
//!   old outbound queue ends the old session
//! - Frames are handled in arrival order per session
//! - Undecodable frames are logged and dropped, the session stays up

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::api::{Request, Response};
use crate::config::{ConnectionManagerConfig, GatewayConfig, NodeServerConfig};
use crate::handlers::{Don, DonError, Handler};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::network::handshake::{unix_now, HandshakeError, NodeAuth};
use crate::network::listener::{self, RunningServer};
use crate::network::{ConnectionManager, NetworkError};
use crate::observability::metrics::record_node_connections;

/// Outbound frames buffered per node session.
const SESSION_QUEUE: usize = 256;

struct NodeSession {
    id: u64,
    tx: mpsc::Sender<String>,
}

/// Sessions and handler of one routing key.
pub struct DonConnectionManager {
    routing_key: String,
    members: HashSet<String>,
    sessions: DashMap<String, NodeSession>,
    handler: OnceLock<Arc<dyn Handler>>,
    next_session: AtomicU64,
}

impl DonConnectionManager {
    fn new(routing_key: String, members: HashSet<String>) -> Self {
        Self {
            routing_key,
            members,
            sessions: DashMap::new(),
            handler: OnceLock::new(),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Attach the handler receiving node responses. Only once.
    pub fn set_handler(&self, handler: Arc<dyn Handler>) -> Result<(), NetworkError> {
        self.handler
            .set(handler)
            .map_err(|_| NetworkError::HandlerAlreadySet(self.routing_key.clone()))
    }

    pub fn is_member(&self, node_address: &str) -> bool {
        self.members.contains(node_address)
    }

    pub fn connected_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.sessions.iter().map(|s| s.key().clone()).collect();
        nodes.sort();
        nodes
    }

    fn register(&self, node_address: &str, tx: mpsc::Sender<String>) -> u64 {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        if self
            .sessions
            .insert(node_address.to_string(), NodeSession { id, tx })
            .is_some()
        {
            tracing::info!(routing_key = %self.routing_key, node = %node_address, "Replacing existing node session");
        }
        record_node_connections(&self.routing_key, self.sessions.len());
        id
    }

    fn unregister(&self, node_address: &str, id: u64) {
        self.sessions.remove_if(node_address, |_, session| session.id == id);
        record_node_connections(&self.routing_key, self.sessions.len());
    }

    async fn handle_frame(&self, node_address: &str, text: &str) {
        let response: Response = match serde_json::from_str(text) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    routing_key = %self.routing_key,
                    node = %node_address,
                    error = %e,
                    "Dropping undecodable node message"
                );
                return;
            }
        };
        let Some(handler) = self.handler.get() else {
            tracing::warn!(routing_key = %self.routing_key, "No handler attached, dropping node message");
            return;
        };
        if let Err(e) = handler.handle_node_message(response, node_address).await {
            tracing::warn!(
                routing_key = %self.routing_key,
                node = %node_address,
                error = %e,
                "Handler rejected node message"
            );
        }
    }
}

#[async_trait]
impl Don for DonConnectionManager {
    async fn send_to_node(&self, node_address: &str, request: &Request) -> Result<(), DonError> {
        let tx = self
            .sessions
            .get(node_address)
            .map(|session| session.tx.clone())
            .ok_or_else(|| DonError::NodeNotConnected(node_address.to_string()))?;
        let text = serde_json::to_string(request)?;
        tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DonError::NodeBusy(node_address.to_string()),
            mpsc::error::TrySendError::Closed(_) => DonError::ConnectionClosed(node_address.to_string()),
        })
    }
}

/// State injected into the upgrade handler.
#[derive(Clone)]
struct NodeState {
    gateway_id: Arc<str>,
    dons: Arc<HashMap<String, Arc<DonConnectionManager>>>,
    tolerance_secs: u64,
    heartbeat: Duration,
    max_message_bytes: usize,
    shutdown: Shutdown,
}

impl NodeState {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(Arc<DonConnectionManager>, String), HandshakeError> {
        let auth = NodeAuth::from_headers(headers)?;
        let don = self
            .dons
            .get(&auth.routing_key)
            .cloned()
            .ok_or_else(|| HandshakeError::UnknownRoutingKey(auth.routing_key.clone()))?;
        auth.verify(&self.gateway_id, unix_now(), self.tolerance_secs)?;
        if !don.is_member(&auth.node_address) {
            return Err(HandshakeError::NotMember(auth.node_address));
        }
        Ok((don, auth.node_address))
    }
}

pub struct NodeConnectionManager {
    config: NodeServerConfig,
    settings: ConnectionManagerConfig,
    gateway_id: String,
    dons: Arc<HashMap<String, Arc<DonConnectionManager>>>,
    running: Mutex<Option<RunningServer>>,
    port: AtomicU16,
    shutdown: Shutdown,
}

impl NodeConnectionManager {
    pub fn new(config: &GatewayConfig) -> Self {
        let dons = config
            .dons
            .iter()
            .map(|don| {
                let members = don.members.iter().map(|m| m.address.to_lowercase()).collect();
                (
                    don.don_id.clone(),
                    Arc::new(DonConnectionManager::new(don.don_id.clone(), members)),
                )
            })
            .collect();

        Self {
            config: config.node_server.clone(),
            settings: config.connection_manager.clone(),
            gateway_id: config.gateway_id.clone(),
            dons: Arc::new(dons),
            running: Mutex::new(None),
            port: AtomicU16::new(0),
            shutdown: Shutdown::new(),
        }
    }

    pub fn don_connection_manager(&self, routing_key: &str) -> Option<Arc<DonConnectionManager>> {
        self.dons.get(routing_key).cloned()
    }

    fn build_router(&self) -> Router {
        let state = NodeState {
            gateway_id: Arc::from(self.gateway_id.as_str()),
            dons: self.dons.clone(),
            tolerance_secs: self.settings.auth_timestamp_tolerance_secs,
            heartbeat: Duration::from_secs(self.settings.heartbeat_interval_secs.max(1)),
            max_message_bytes: self.config.max_message_bytes,
            shutdown: self.shutdown.clone(),
        };
        Router::new()
            .route(&self.config.path, get(node_upgrade))
            .with_state(state)
    }
}

async fn node_upgrade(
    State(state): State<NodeState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> HttpResponse {
    let (don, node_address) = match state.authenticate(&headers) {
        Ok(authenticated) => authenticated,
        Err(e) => {
            tracing::warn!(error = %e, "Node handshake rejected");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let heartbeat = state.heartbeat;
    let shutdown = state.shutdown.subscribe();
    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| run_session(don, node_address, socket, heartbeat, shutdown))
}

async fn run_session(
    don: Arc<DonConnectionManager>,
    node_address: String,
    socket: WebSocket,
    heartbeat: Duration,
    mut shutdown: ShutdownSignal,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(SESSION_QUEUE);
    let session_id = don.register(&node_address, tx);
    tracing::info!(routing_key = %don.routing_key, node = %node_address, "Node connected");

    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                        tracing::warn!(node = %node_address, error = %e, "Failed to write to node");
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => don.handle_frame(&node_address, text.as_str()).await,
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(node = %node_address, error = %e, "Node connection error");
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Bytes::new())).await {
                    tracing::warn!(node = %node_address, error = %e, "Heartbeat failed");
                    break;
                }
            }
            _ = shutdown.recv() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }

    don.unregister(&node_address, session_id);
    tracing::info!(routing_key = %don.routing_key, node = %node_address, "Node disconnected");
}

#[async_trait]
impl ConnectionManager for NodeConnectionManager {
    async fn start(&self) -> Result<(), NetworkError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(NetworkError::AlreadyStarted);
        }
        let server = listener::serve(
            "node",
            &self.config.bind_address,
            self.config.tls.as_ref(),
            self.build_router(),
        )
        .await?;
        self.port.store(server.local_addr().port(), Ordering::Release);
        *running = Some(server);
        Ok(())
    }

    async fn close(&self) -> Result<(), NetworkError> {
        self.shutdown.trigger();
        let server = self.running.lock().await.take();
        match server {
            Some(server) => {
                server
                    .shutdown(Duration::from_millis(self.config.shutdown_timeout_ms))
                    .await
            }
            None => Ok(()),
        }
    }

    fn port(&self) -> Option<u16> {
        match self.port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    fn connected_nodes(&self, routing_key: &str) -> Vec<String> {
        self.dons
            .get(routing_key)
            .map(|don| don.connected_nodes())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DonConfig, NodeConfig};
    use crate::network::handshake::handshake_headers;
    use alloy::signers::local::PrivateKeySigner;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    const MEMBER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const OUTSIDER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const MEMBER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn gateway_config() -> GatewayConfig {
        let mut config = GatewayConfig {
            gateway_id: "gw".into(),
            ..Default::default()
        };
        config.node_server.bind_address = "127.0.0.1:0".into();
        config.dons.push(DonConfig {
            don_id: "donA".into(),
            handler_name: "dummy".into(),
            members: vec![NodeConfig {
                name: "n1".into(),
                address: "0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266".into(),
            }],
            ..Default::default()
        });
        config
    }

    type NodeSocket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn dial(port: u16, key: &str, routing_key: &str) -> Result<NodeSocket, tokio_tungstenite::tungstenite::Error> {
        let signer: PrivateKeySigner = key.parse().unwrap();
        let mut request = format!("ws://127.0.0.1:{}/node", port).into_client_request()?;
        for (name, value) in handshake_headers(&signer, routing_key, "gw", unix_now() as u32).unwrap() {
            request.headers_mut().insert(name, HeaderValue::from_str(&value).unwrap());
        }
        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(socket)
    }

    async fn wait_for_node(manager: &NodeConnectionManager, node: &str) {
        for _ in 0..100 {
            if manager.connected_nodes("donA").iter().any(|n| n == node) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("node {node} never connected");
    }

    #[tokio::test]
    async fn test_member_connects_and_outsider_is_rejected() {
        let manager = NodeConnectionManager::new(&gateway_config());
        manager.start().await.unwrap();
        let port = manager.port().unwrap();

        let _session = dial(port, MEMBER_KEY, "donA").await.unwrap();
        wait_for_node(&manager, MEMBER).await;

        let rejected = dial(port, OUTSIDER_KEY, "donA").await.unwrap_err();
        assert!(matches!(
            rejected,
            tokio_tungstenite::tungstenite::Error::Http(ref response) if response.status() == 401
        ));
        let unknown = dial(port, MEMBER_KEY, "donZ").await.unwrap_err();
        assert!(matches!(unknown, tokio_tungstenite::tungstenite::Error::Http(_)));

        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_to_unconnected_node() {
        let manager = NodeConnectionManager::new(&gateway_config());
        let don = manager.don_connection_manager("donA").unwrap();
        let err = don
            .send_to_node(MEMBER, &Request::new("1", "dummy", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DonError::NodeNotConnected(_)));
        assert!(manager.don_connection_manager("donZ").is_none());
    }

    #[tokio::test]
    async fn test_stalled_session_does_not_block_sends() {
        let manager = NodeConnectionManager::new(&gateway_config());
        let don = manager.don_connection_manager("donA").unwrap();
        let (tx, _rx) = mpsc::channel(1);
        don.register(MEMBER, tx);

        don.send_to_node(MEMBER, &Request::new("1", "dummy", None)).await.unwrap();
        let err = tokio::time::timeout(
            Duration::from_millis(500),
            don.send_to_node(MEMBER, &Request::new("2", "dummy", None)),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, DonError::NodeBusy(_)));
    }

    #[tokio::test]
    async fn test_send_to_closed_session() {
        let manager = NodeConnectionManager::new(&gateway_config());
        let don = manager.don_connection_manager("donA").unwrap();
        let (tx, rx) = mpsc::channel(1);
        don.register(MEMBER, tx);
        drop(rx);

        let err = don
            .send_to_node(MEMBER, &Request::new("1", "dummy", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DonError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_undrained_session_does_not_block_dispatch() {
        use crate::api::JsonRpcCodec;
        use crate::gateway::Dispatcher;
        use crate::handlers::dummy::DummyHandler;
        use crate::observability::PrometheusMetrics;
        use std::collections::BTreeMap;

        let config = gateway_config();
        let manager = NodeConnectionManager::new(&config);
        let don = manager.don_connection_manager("donA").unwrap();
        let (tx, _rx) = mpsc::channel(1);
        don.register(MEMBER, tx);

        let mut don_config = config.dons[0].clone();
        don_config.members[0].address = MEMBER.into();
        let handler: Arc<dyn Handler> = Arc::new(
            DummyHandler::new(&serde_json::json!({ "methods": ["svc.get"] }), &don_config, don.clone()).unwrap(),
        );
        let dispatcher = Dispatcher::new(
            Arc::new(JsonRpcCodec),
            BTreeMap::from([("donA".to_string(), handler)]),
            HashMap::from([("svc".to_string(), "donA".to_string())]),
            Arc::new(PrometheusMetrics),
        );

        // First request fills the queue and waits out its deadline.
        let deadline = Instant::now() + Duration::from_millis(50);
        let (_, status) = dispatcher
            .process_request(br#"{"jsonrpc":"2.0","id":"1","method":"svc.get"}"#, "", deadline)
            .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

        // Second request finds the queue full and is rejected at once.
        let deadline = Instant::now() + Duration::from_millis(50);
        let (body, status) = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.process_request(br#"{"jsonrpc":"2.0","id":"2","method":"svc.get"}"#, "", deadline),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"]["message"].as_str().unwrap().contains("is full"));
    }
}
