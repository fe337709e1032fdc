//! Node-side gateway connector.
//!
//! # Data Flow
//! ```text
//! connect (signed handshake headers)
//!     → websocket session
//!         gateway request → ConnectorHandler (own task) → GatewaySender → gateway
//!     → on disconnect: backoff, reconnect
//! ```
//!
//! # Design Decisions
//! - Each request is handled in its own task so a slow handler never blocks
//!   the read loop
//! - A fresh timestamp is signed on every connection attempt
//! - Reconnects run until `close`

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::api::{Request, Response, SignatureError};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::network::handshake::{handshake_headers, unix_now};
use crate::resilience::ReconnectBackoff;

const OUTBOUND_QUEUE: usize = 256;

type GatewaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("invalid gateway url: {0}")]
    Url(String),

    #[error("invalid handshake header: {0}")]
    Header(String),

    #[error("handshake signing failed: {0}")]
    Signature(#[from] SignatureError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("not connected to gateway")]
    NotConnected,

    #[error("connector already started")]
    AlreadyStarted,
}

/// Connector configuration for one node of one DON.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorConfig {
    /// `ws://` or `wss://` URL of the gateway node endpoint.
    pub gateway_url: String,

    pub gateway_id: String,

    pub routing_key: String,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl ConnectorConfig {
    /// Reconnect pacing configured for this connector.
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

/// Node business logic answering gateway requests.
#[async_trait]
pub trait ConnectorHandler: Send + Sync {
    async fn handle_gateway_message(&self, request: Request, sender: GatewaySender);
}

/// Reply channel into the current gateway session.
#[derive(Debug, Clone)]
pub struct GatewaySender {
    tx: mpsc::Sender<String>,
}

impl GatewaySender {
    pub async fn send_response(&self, response: &Response) -> Result<(), ConnectorError> {
        let text = serde_json::to_string(response)?;
        self.tx.send(text).await.map_err(|_| ConnectorError::NotConnected)
    }
}

struct Inner {
    config: ConnectorConfig,
    signer: PrivateKeySigner,
    handler: Arc<dyn ConnectorHandler>,
    connected: watch::Sender<bool>,
}

pub struct GatewayConnector {
    inner: Arc<Inner>,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GatewayConnector {
    pub fn new(
        config: ConnectorConfig,
        signer: PrivateKeySigner,
        handler: Arc<dyn ConnectorHandler>,
    ) -> Result<Self, ConnectorError> {
        let url = Url::parse(&config.gateway_url).map_err(|e| ConnectorError::Url(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectorError::Url(format!("unsupported scheme {}", url.scheme())));
        }
        let (connected, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                signer,
                handler,
                connected,
            }),
            shutdown: Shutdown::new(),
            task: Mutex::new(None),
        })
    }

    /// Lowercase hex address this node authenticates as.
    pub fn address(&self) -> String {
        self.inner.signer.address().to_string().to_lowercase()
    }

    /// Spawn the connect/reconnect loop.
    pub fn start(&self) -> Result<(), ConnectorError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Err(ConnectorError::AlreadyStarted);
        }
        *task = Some(tokio::spawn(run(self.inner.clone(), self.shutdown.subscribe())));
        Ok(())
    }

    /// Stop reconnecting and close the current session.
    pub async fn close(&self) {
        self.shutdown.trigger();
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Connector task failed");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Wait until a session is up, at most `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.connected.subscribe();
        let result = tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)).await;
        matches!(result, Ok(Ok(_)))
    }
}

impl Inner {
    async fn connect(&self) -> Result<GatewaySocket, ConnectorError> {
        let mut request = self.config.gateway_url.as_str().into_client_request()?;
        let headers = handshake_headers(
            &self.signer,
            &self.config.routing_key,
            &self.config.gateway_id,
            unix_now() as u32,
        )?;
        for (name, value) in headers {
            let value = HeaderValue::from_str(&value).map_err(|e| ConnectorError::Header(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }
        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(socket)
    }

    /// Serve one session. Returns true when it ended because of shutdown.
    async fn session(&self, socket: GatewaySocket, shutdown: &mut ShutdownSignal) -> bool {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let sender = GatewaySender { tx };

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    if let Some(text) = outbound {
                        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                            tracing::warn!(error = %e, "Failed to write to gateway");
                            return false;
                        }
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Request>(text.as_str()) {
                        Ok(request) => {
                            let handler = self.handler.clone();
                            let sender = sender.clone();
                            tokio::spawn(async move { handler.handle_gateway_message(request, sender).await });
                        }
                        Err(e) => tracing::warn!(error = %e, "Dropping undecodable gateway message"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Gateway connection error");
                        return false;
                    }
                },
                _ = shutdown.recv() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return true;
                }
            }
        }
    }
}

async fn run(inner: Arc<Inner>, mut shutdown: ShutdownSignal) {
    let mut backoff = inner.config.backoff();
    loop {
        tokio::select! {
            result = inner.connect() => match result {
                Ok(socket) => {
                    backoff.reset();
                    inner.connected.send_replace(true);
                    tracing::info!(
                        routing_key = %inner.config.routing_key,
                        gateway = %inner.config.gateway_url,
                        "Connected to gateway"
                    );
                    let stopped = inner.session(socket, &mut shutdown).await;
                    inner.connected.send_replace(false);
                    if stopped {
                        return;
                    }
                    tracing::info!(routing_key = %inner.config.routing_key, "Disconnected from gateway");
                }
                Err(e) => {
                    tracing::warn!(
                        routing_key = %inner.config.routing_key,
                        failures = backoff.failures(),
                        error = %e,
                        "Gateway connection failed"
                    );
                }
            },
            _ = shutdown.recv() => return,
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.recv() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ConnectorHandler for Noop {
        async fn handle_gateway_message(&self, _request: Request, _sender: GatewaySender) {}
    }

    fn config(url: &str) -> ConnectorConfig {
        ConnectorConfig {
            gateway_url: url.into(),
            gateway_id: "gw".into(),
            routing_key: "donA".into(),
            base_backoff_ms: 10,
            max_backoff_ms: 50,
        }
    }

    fn signer() -> PrivateKeySigner {
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".parse().unwrap()
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(matches!(
            GatewayConnector::new(config("http://localhost:1/node"), signer(), Arc::new(Noop)),
            Err(ConnectorError::Url(_))
        ));
        assert!(matches!(
            GatewayConnector::new(config("not a url"), signer(), Arc::new(Noop)),
            Err(ConnectorError::Url(_))
        ));
    }

    #[test]
    fn test_backoff_follows_config() {
        let mut backoff = config("ws://localhost:1/node").backoff();
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(11));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert!(backoff.next_delay() <= Duration::from_millis(55));
    }

    #[tokio::test]
    async fn test_retries_until_closed() {
        // Nothing listens on port 1; the loop keeps backing off until close.
        let connector = GatewayConnector::new(config("ws://127.0.0.1:1/node"), signer(), Arc::new(Noop)).unwrap();
        assert_eq!(connector.address(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        connector.start().unwrap();
        assert!(matches!(connector.start(), Err(ConnectorError::AlreadyStarted)));
        assert!(!connector.wait_connected(Duration::from_millis(100)).await);
        tokio::time::timeout(Duration::from_secs(1), connector.close()).await.unwrap();
        assert!(!connector.is_connected());
    }
}
