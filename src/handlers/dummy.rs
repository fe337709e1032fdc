//! Reference handler: fan out to every DON member, first answer wins.
//!
//! # Responsibilities
//! - Remember the user callback under a fresh node-facing request ID, so
//!   users reusing the same JSON-RPC ID never collide
//! - Forward the request to all DON members
//! - Deliver the first node response for an ID, with the user's ID restored,
//!   and drop the rest
//! - Evict requests nobody answered within `pending_timeout_ms`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::{ErrorCode, JsonRpcCodec, Message, Request, Response};
use crate::config::DonConfig;
use crate::handlers::{Callback, Don, Handler, HandlerError, UserCallbackPayload};
use crate::lifecycle::Shutdown;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DummyHandlerConfig {
    /// Methods served by this handler.
    pub methods: Vec<String>,
    pub pending_timeout_ms: u64,
}

impl Default for DummyHandlerConfig {
    fn default() -> Self {
        Self {
            methods: vec!["dummy".to_string()],
            pending_timeout_ms: 60_000,
        }
    }
}

struct PendingRequest {
    /// ID the user sent; restored on the response.
    caller_id: String,
    callback: Callback,
    received_at: Instant,
}

struct Sweeper {
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

pub struct DummyHandler {
    config: DummyHandlerConfig,
    routing_key: String,
    members: Vec<String>,
    don: Arc<dyn Don>,
    /// Pending requests by the ID sent to nodes.
    pending: Arc<DashMap<String, PendingRequest>>,
    next_id: AtomicU64,
    sweeper: Mutex<Option<Sweeper>>,
}

impl DummyHandler {
    pub fn new(
        config: &serde_json::Value,
        don_config: &DonConfig,
        don: Arc<dyn Don>,
    ) -> Result<Self, HandlerError> {
        let config = if config.is_null() {
            DummyHandlerConfig::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| HandlerError::Config(e.to_string()))?
        };
        if config.pending_timeout_ms == 0 {
            return Err(HandlerError::Config("pending_timeout_ms must be positive".into()));
        }

        Ok(Self {
            config,
            routing_key: don_config.don_id.clone(),
            members: don_config
                .members
                .iter()
                .map(|m| m.address.to_lowercase())
                .collect(),
            don,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            sweeper: Mutex::new(None),
        })
    }

    /// Number of requests still waiting for a node.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    async fn forward(&self, mut request: Request, callback: Callback) -> Result<(), HandlerError> {
        let caller_id = std::mem::take(&mut request.id);
        let id = format!("{}-{}", self.routing_key, self.next_id.fetch_add(1, Ordering::Relaxed));
        request.id = id.clone();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                caller_id: caller_id.clone(),
                callback,
                received_at: Instant::now(),
            },
        );

        let mut delivered = 0usize;
        let mut last_error = None;
        for node in &self.members {
            match self.don.send_to_node(node, &request).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        routing_key = %self.routing_key,
                        node = %node,
                        request_id = %caller_id,
                        error = %e,
                        "Failed to forward request to node"
                    );
                    last_error = Some(e);
                }
            }
        }

        if delivered == 0 {
            self.pending.remove(&id);
            return Err(match last_error {
                Some(e) => e.into(),
                None => HandlerError::Unsupported(format!("DON {} has no members", self.routing_key)),
            });
        }

        tracing::debug!(
            routing_key = %self.routing_key,
            request_id = %caller_id,
            node_request_id = %id,
            nodes = delivered,
            "Request forwarded"
        );
        Ok(())
    }

    async fn sweep(pending: Arc<DashMap<String, PendingRequest>>, timeout: Duration, shutdown: Shutdown) {
        let mut signal = shutdown.subscribe();
        let mut ticker = tokio::time::interval(timeout / 2);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let before = pending.len();
                    pending.retain(|_, p| p.received_at.elapsed() < timeout);
                    let evicted = before.saturating_sub(pending.len());
                    if evicted > 0 {
                        tracing::debug!(evicted, "Evicted expired pending requests");
                    }
                }
                _ = signal.recv() => break,
            }
        }
    }
}

#[async_trait]
impl Handler for DummyHandler {
    fn methods(&self) -> Vec<String> {
        self.config.methods.clone()
    }

    async fn handle_legacy_user_message(
        &self,
        message: Message,
        callback: Callback,
    ) -> Result<(), HandlerError> {
        let request = JsonRpcCodec.legacy_request(&message)?;
        self.forward(request, callback).await
    }

    async fn handle_jsonrpc_user_message(
        &self,
        request: Request,
        callback: Callback,
    ) -> Result<(), HandlerError> {
        self.forward(request, callback).await
    }

    async fn handle_node_message(
        &self,
        mut response: Response,
        node_address: &str,
    ) -> Result<(), HandlerError> {
        let Some((_, pending)) = self.pending.remove(&response.id) else {
            tracing::debug!(
                node = %node_address,
                request_id = %response.id,
                "Ignoring response for unknown or completed request"
            );
            return Ok(());
        };
        let id = pending.caller_id;
        response.id = id.clone();

        let payload = match serde_json::to_vec(&response) {
            Ok(raw_response) => UserCallbackPayload {
                raw_response,
                error_code: ErrorCode::NoError,
            },
            Err(e) => {
                let failure = Response::failure(id.clone(), ErrorCode::NodeResponseEncodingError.to_jsonrpc_code(), e.to_string());
                UserCallbackPayload {
                    raw_response: serde_json::to_vec(&failure).unwrap_or_default(),
                    error_code: ErrorCode::NodeResponseEncodingError,
                }
            }
        };

        if let Err(e) = pending.callback.send_response(payload) {
            tracing::debug!(request_id = %id, error = %e, "Caller no longer waiting");
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), HandlerError> {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return Ok(());
        }
        let shutdown = Shutdown::new();
        let task = tokio::spawn(Self::sweep(
            self.pending.clone(),
            Duration::from_millis(self.config.pending_timeout_ms),
            shutdown.clone(),
        ));
        *sweeper = Some(Sweeper { shutdown, task });
        tracing::info!(routing_key = %self.routing_key, methods = ?self.config.methods, "Dummy handler started");
        Ok(())
    }

    async fn close(&self) -> Result<(), HandlerError> {
        let sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Sweeper { shutdown, task }) = sweeper {
            shutdown.trigger();
            if let Err(e) = task.await {
                tracing::warn!(routing_key = %self.routing_key, error = %e, "Sweeper task failed");
            }
        }
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::handlers::{new_callback, DonError};
    use serde_json::value::RawValue;

    const NODE_A: &str = "0x0000000000000000000000000000000000000001";
    const NODE_B: &str = "0x0000000000000000000000000000000000000002";

    #[derive(Default)]
    struct RecordingDon {
        sent: Mutex<Vec<(String, String)>>,
        offline: Vec<String>,
    }

    #[async_trait]
    impl Don for RecordingDon {
        async fn send_to_node(&self, node: &str, request: &Request) -> Result<(), DonError> {
            if self.offline.iter().any(|n| n == node) {
                return Err(DonError::NodeNotConnected(node.to_string()));
            }
            self.sent.lock().unwrap().push((node.to_string(), request.id.clone()));
            Ok(())
        }
    }

    fn don_config() -> DonConfig {
        DonConfig {
            don_id: "donA".into(),
            members: vec![
                NodeConfig { name: "a".into(), address: NODE_A.into() },
                NodeConfig { name: "b".into(), address: NODE_B.into() },
            ],
            ..Default::default()
        }
    }

    fn response(id: &str, value: &str) -> Response {
        Response::success(id, "dummy", RawValue::from_string(value.to_string()).unwrap())
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    impl RecordingDon {
        fn node_ids(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, id)| id.clone()).collect()
        }
    }

    #[tokio::test]
    async fn test_fan_out_first_response_wins() {
        let don = Arc::new(RecordingDon::default());
        let handler = DummyHandler::new(&serde_json::Value::Null, &don_config(), don.clone()).unwrap();

        let (callback, waiter) = new_callback();
        handler
            .handle_jsonrpc_user_message(Request::new("r1", "dummy", None), callback)
            .await
            .unwrap();
        let ids = don.node_ids();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[0], "r1");
        assert_eq!(handler.pending_count(), 1);

        handler.handle_node_message(response(&ids[0], "1"), NODE_B).await.unwrap();
        handler.handle_node_message(response(&ids[0], "2"), NODE_A).await.unwrap();

        let payload = waiter.wait(deadline()).await.unwrap();
        assert_eq!(payload.error_code, ErrorCode::NoError);
        let value: serde_json::Value = serde_json::from_slice(&payload.raw_response).unwrap();
        assert_eq!(value["id"], "r1");
        assert_eq!(value["result"], 1);
        assert_eq!(handler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_callers_reusing_an_id_do_not_collide() {
        let don = Arc::new(RecordingDon::default());
        let handler = DummyHandler::new(&serde_json::Value::Null, &don_config(), don.clone()).unwrap();
        let (cb1, w1) = new_callback();
        let (cb2, w2) = new_callback();
        handler.handle_jsonrpc_user_message(Request::new("1", "dummy", None), cb1).await.unwrap();
        handler.handle_jsonrpc_user_message(Request::new("1", "dummy", None), cb2).await.unwrap();
        assert_eq!(handler.pending_count(), 2);

        let ids = don.node_ids();
        assert_ne!(ids[0], ids[2]);
        handler.handle_node_message(response(&ids[2], r#""second""#), NODE_A).await.unwrap();
        handler.handle_node_message(response(&ids[0], r#""first""#), NODE_A).await.unwrap();

        for (waiter, expected) in [(w1, "first"), (w2, "second")] {
            let payload = waiter.wait(deadline()).await.unwrap();
            let value: serde_json::Value = serde_json::from_slice(&payload.raw_response).unwrap();
            assert_eq!(value["id"], "1");
            assert_eq!(value["result"], expected);
        }
    }

    #[tokio::test]
    async fn test_unknown_node_response_ignored() {
        let handler = DummyHandler::new(&serde_json::Value::Null, &don_config(), Arc::new(RecordingDon::default())).unwrap();
        handler.handle_node_message(response("r1", "1"), NODE_A).await.unwrap();
        assert_eq!(handler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_all_nodes_offline() {
        let don = Arc::new(RecordingDon {
            offline: vec![NODE_A.into(), NODE_B.into()],
            ..Default::default()
        });
        let handler = DummyHandler::new(&serde_json::Value::Null, &don_config(), don).unwrap();
        let (callback, _waiter) = new_callback();
        let err = handler
            .handle_jsonrpc_user_message(Request::new("r", "dummy", None), callback)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Don(DonError::NodeNotConnected(_))));
        assert_eq!(handler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_expired() {
        let config = serde_json::json!({"pending_timeout_ms": 40});
        let handler = DummyHandler::new(&config, &don_config(), Arc::new(RecordingDon::default())).unwrap();
        handler.start().await.unwrap();

        let (callback, waiter) = new_callback();
        handler
            .handle_jsonrpc_user_message(Request::new("r", "dummy", None), callback)
            .await
            .unwrap();

        // Evicting the entry drops the only callback, which ends the wait.
        let err = waiter.wait(Instant::now() + Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err, crate::handlers::CallbackError::Dropped);
        assert_eq!(handler.pending_count(), 0);
        handler.close().await.unwrap();
    }

    #[test]
    fn test_invalid_config() {
        let config = serde_json::json!({"methods": "not-a-list"});
        assert!(matches!(
            DummyHandler::new(&config, &don_config(), Arc::new(RecordingDon::default())),
            Err(HandlerError::Config(_))
        ));
    }
}
