//! Gateway orchestrator.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → from_config (per DON: connection manager, MultiHandler, service index)
//!     → Gateway::new (dispatcher registered on the user transport)
//!
//! start: handlers (by routing key) → connection manager → user server
//! close: user server → connection manager → handlers (all, errors joined)
//! ```
//!
//! # Design Decisions
//! - Registries are built once and never change afterwards
//! - Lifecycle is `NotStarted → Running → Closed`; a failed start rolls back
//!   everything and lands in `Closed`
//! - The dispatcher is a separate `Arc` so the transport never owns the gateway

pub mod dispatcher;
pub mod state;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy::primitives::Address;
use axum::http::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::api::{Codec, JsonRpcCodec};
use crate::config::GatewayConfig;
use crate::handlers::{Handler, HandlerError, HandlerFactory, MultiHandler};
use crate::network::{ConnectionManager, HttpTransport, NetworkError, NodeConnectionManager, UserServer};
use crate::observability::MetricsSink;

pub use dispatcher::Dispatcher;
pub use state::GatewayState;

use state::StateCell;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("duplicate routing key: {0}")]
    DuplicateRoutingKey(String),

    #[error("duplicate service name: {0}")]
    DuplicateServiceName(String),

    #[error("no connection manager for routing key {0}")]
    MissingConnectionManager(String),

    #[error("invalid member address {address:?} for routing key {routing_key}")]
    InvalidMemberAddress { routing_key: String, address: String },

    #[error("routing key {routing_key}: {source}")]
    Handler {
        routing_key: String,
        #[source]
        source: HandlerError,
    },

    #[error("gateway already started")]
    AlreadyStarted,

    #[error("gateway already closed")]
    AlreadyClosed,

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("{}", crate::join_errors(.0))]
    Close(Vec<GatewayError>),
}

pub struct Gateway {
    dispatcher: Arc<Dispatcher>,
    http: Arc<dyn HttpTransport>,
    conn_mgr: Arc<dyn ConnectionManager>,
    state: StateCell,
    /// Serializes start and close.
    transition: Mutex<()>,
}

impl Gateway {
    /// Wire the gateway from explicit collaborators.
    pub fn new(
        codec: Arc<dyn Codec>,
        http: Arc<dyn HttpTransport>,
        handlers: BTreeMap<String, Arc<dyn Handler>>,
        service_index: HashMap<String, String>,
        conn_mgr: Arc<dyn ConnectionManager>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(codec, handlers, service_index, metrics));
        http.set_request_handler(dispatcher.clone());
        Self {
            dispatcher,
            http,
            conn_mgr,
            state: StateCell::new(),
            transition: Mutex::new(()),
        }
    }

    /// Build every component from configuration.
    pub fn from_config(
        config: &GatewayConfig,
        factory: &dyn HandlerFactory,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, GatewayError> {
        let codec: Arc<dyn Codec> = Arc::new(JsonRpcCodec);
        let http = Arc::new(UserServer::new(config.user_server.clone()));
        let conn_mgr = Arc::new(NodeConnectionManager::new(config));

        let mut handlers: BTreeMap<String, Arc<dyn Handler>> = BTreeMap::new();
        let mut service_index: HashMap<String, String> = HashMap::new();

        for don in &config.dons {
            let routing_key = don.don_id.clone();
            if handlers.contains_key(&routing_key) {
                return Err(GatewayError::DuplicateRoutingKey(routing_key));
            }
            let don_mgr = conn_mgr
                .don_connection_manager(&routing_key)
                .ok_or_else(|| GatewayError::MissingConnectionManager(routing_key.clone()))?;

            let mut don = don.clone();
            for member in &mut don.members {
                if member.address.parse::<Address>().is_err() {
                    return Err(GatewayError::InvalidMemberAddress {
                        routing_key,
                        address: member.address.clone(),
                    });
                }
                member.address = member.address.to_lowercase();
            }

            let handler_configs = don.handler_configs();
            let multi = MultiHandler::new(&handler_configs, &don, don_mgr.clone(), factory).map_err(|source| {
                GatewayError::Handler {
                    routing_key: routing_key.clone(),
                    source,
                }
            })?;

            for handler_config in &handler_configs {
                if handler_config.service_name.is_empty() {
                    continue;
                }
                if service_index
                    .insert(handler_config.service_name.clone(), routing_key.clone())
                    .is_some()
                {
                    return Err(GatewayError::DuplicateServiceName(handler_config.service_name.clone()));
                }
            }

            let multi: Arc<dyn Handler> = Arc::new(multi);
            don_mgr.set_handler(multi.clone())?;
            tracing::info!(
                routing_key = %routing_key,
                handlers = handler_configs.len(),
                members = don.members.len(),
                "DON configured"
            );
            handlers.insert(routing_key, multi);
        }

        Ok(Self::new(codec, http, handlers, service_index, conn_mgr, metrics))
    }

    pub fn state(&self) -> GatewayState {
        self.state.get()
    }

    /// Start handlers, then the connection manager, then the user server.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let _guard = self.transition.lock().await;
        match self.state.get() {
            GatewayState::Running => return Err(GatewayError::AlreadyStarted),
            GatewayState::Closed => return Err(GatewayError::AlreadyClosed),
            GatewayState::NotStarted => {}
        }

        if let Err(e) = self.start_components().await {
            tracing::error!(error = %e, "Gateway start failed, rolling back");
            if let Err(close_err) = self.close_components().await {
                tracing::error!(error = %close_err, "Rollback close failed");
            }
            self.state.set(GatewayState::Closed);
            return Err(e);
        }

        self.state.set(GatewayState::Running);
        tracing::info!(
            user_port = ?self.user_port(),
            node_port = ?self.node_port(),
            "Gateway started"
        );
        Ok(())
    }

    /// Close every component, reporting all failures together.
    pub async fn close(&self) -> Result<(), GatewayError> {
        let _guard = self.transition.lock().await;
        match self.state.get() {
            GatewayState::NotStarted => {
                self.state.set(GatewayState::Closed);
                Ok(())
            }
            GatewayState::Closed => Ok(()),
            GatewayState::Running => {
                let result = self.close_components().await;
                self.state.set(GatewayState::Closed);
                tracing::info!("Gateway closed");
                result
            }
        }
    }

    async fn start_components(&self) -> Result<(), GatewayError> {
        for (routing_key, handler) in self.dispatcher.handlers() {
            handler.start().await.map_err(|source| GatewayError::Handler {
                routing_key: routing_key.clone(),
                source,
            })?;
        }
        self.conn_mgr.start().await?;
        self.http.start().await?;
        Ok(())
    }

    async fn close_components(&self) -> Result<(), GatewayError> {
        let mut errors = Vec::new();
        if let Err(e) = self.http.close().await {
            errors.push(GatewayError::Network(e));
        }
        if let Err(e) = self.conn_mgr.close().await {
            errors.push(GatewayError::Network(e));
        }
        for (routing_key, handler) in self.dispatcher.handlers() {
            if let Err(source) = handler.close().await {
                errors.push(GatewayError::Handler {
                    routing_key: routing_key.clone(),
                    source,
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Close(errors))
        }
    }

    /// Decode, route and wait for one user request.
    pub async fn process_request(&self, raw: &[u8], auth: &str, deadline: Instant) -> (Vec<u8>, StatusCode) {
        self.dispatcher.process_request(raw, auth, deadline).await
    }

    pub fn user_port(&self) -> Option<u16> {
        self.http.port()
    }

    pub fn node_port(&self) -> Option<u16> {
        self.conn_mgr.port()
    }

    /// Nodes with a live session for `routing_key`.
    pub fn connected_nodes(&self, routing_key: &str) -> Vec<String> {
        self.conn_mgr.connected_nodes(routing_key)
    }
}
