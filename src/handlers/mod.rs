//! Handler subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway (user request, fresh Callback)
//!     → multi.rs (route by method name to one sub-handler)
//!     → concrete handler (accept and queue, fan out to nodes via Don)
//!
//! Node response (connection manager)
//!     → multi.rs handle_node_message (route by response method)
//!     → concrete handler
//!     → callback.rs send_response → waiting Gateway
//! ```
//!
//! # Design Decisions
//! - Dispatch calls return quickly; results flow back only through the Callback
//! - Handlers are shared as `Arc<dyn Handler>` and built once at startup
//! - Method indices are immutable after construction

pub mod callback;
pub mod dummy;
pub mod factory;
pub mod multi;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::{CodecError, Message, Request, Response};

pub use callback::{new_callback, Callback, CallbackError, ResponseWaiter, UserCallbackPayload};
pub use factory::{DefaultHandlerFactory, HandlerFactory};
pub use multi::MultiHandler;

/// Errors raised by handlers, both at construction and at dispatch time.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("unknown handler type: {0}")]
    UnknownHandlerType(String),

    #[error("invalid handler config: {0}")]
    Config(String),

    #[error("duplicate method name: {0}")]
    DuplicateMethod(String),

    #[error("duplicate handler name: {0}")]
    DuplicateHandler(String),

    #[error("handler not found for method: {0}")]
    MethodNotFound(String),

    #[error("method {method}: {source}")]
    Routing {
        method: String,
        #[source]
        source: Box<HandlerError>,
    },

    #[error("{0}")]
    Unsupported(String),

    #[error(transparent)]
    Don(#[from] DonError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{}", crate::join_errors(.0))]
    Multiple(Vec<HandlerError>),
}

/// Errors delivering a message to a node.
#[derive(Debug, Error)]
pub enum DonError {
    #[error("node {0} is not connected")]
    NodeNotConnected(String),

    #[error("connection to node {0} closed")]
    ConnectionClosed(String),

    #[error("outbound queue of node {0} is full")]
    NodeBusy(String),

    #[error("failed to encode node message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Business logic bound to one routing key.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Method names this handler serves.
    fn methods(&self) -> Vec<String>;

    async fn handle_legacy_user_message(
        &self,
        message: Message,
        callback: Callback,
    ) -> Result<(), HandlerError>;

    async fn handle_jsonrpc_user_message(
        &self,
        request: Request,
        callback: Callback,
    ) -> Result<(), HandlerError>;

    /// Asynchronous response from a node of this handler's DON.
    async fn handle_node_message(
        &self,
        response: Response,
        node_address: &str,
    ) -> Result<(), HandlerError>;

    async fn start(&self) -> Result<(), HandlerError>;

    async fn close(&self) -> Result<(), HandlerError>;
}

/// Outbound view of a DON: the nodes behind one routing key.
#[async_trait]
pub trait Don: Send + Sync {
    async fn send_to_node(&self, node_address: &str, request: &Request) -> Result<(), DonError>;
}
