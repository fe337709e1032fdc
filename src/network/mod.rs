//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! User POST <path>
//!     → listener.rs (bind, optional TLS, graceful shutdown handle)
//!     → http_server.rs (body limit, request ID, auth header, deadline)
//!     → RequestProcessor (the gateway dispatcher)
//!
//! Node websocket GET <node path>
//!     → handshake.rs (signed headers, membership)
//!     → connection_manager.rs (one session per node, heartbeats)
//!     → Handler::handle_node_message
//! ```
//!
//! # Design Decisions
//! - Transports are traits so the gateway can be driven without sockets
//! - Port 0 binds an ephemeral port; `port()` reports the bound one
//! - Close is graceful up to the configured shutdown timeout

pub mod connection_manager;
pub mod handshake;
pub mod http_server;
pub mod listener;
pub mod tls;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;
use tokio::time::Instant;

pub use connection_manager::{DonConnectionManager, NodeConnectionManager};
pub use handshake::HandshakeError;
pub use http_server::UserServer;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Tls(std::io::Error),

    #[error("server already started")]
    AlreadyStarted,

    #[error("request handler not set")]
    NoRequestHandler,

    #[error("handler already attached to routing key {0}")]
    HandlerAlreadySet(String),

    #[error("server task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Turns a raw user request into a response body and HTTP status.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process_request(&self, raw: &[u8], auth: &str, deadline: Instant) -> (Vec<u8>, StatusCode);
}

/// User-facing transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Register the processor. Must happen before `start`.
    fn set_request_handler(&self, handler: Arc<dyn RequestProcessor>);

    async fn start(&self) -> Result<(), NetworkError>;

    async fn close(&self) -> Result<(), NetworkError>;

    /// Bound port, once started.
    fn port(&self) -> Option<u16>;
}

/// Node-facing transport.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn start(&self) -> Result<(), NetworkError>;

    async fn close(&self) -> Result<(), NetworkError>;

    fn port(&self) -> Option<u16>;

    /// Addresses of nodes with a live session for `routing_key`.
    fn connected_nodes(&self, routing_key: &str) -> Vec<String>;
}
