//! DON request gateway library.
//!
//! Users POST JSON-RPC requests; the gateway routes each one to the handler
//! of a DON (by routing key or service name), the handler talks to the DON's
//! nodes over websockets, and the first result delivered through the
//! request's callback becomes the HTTP response.

pub mod api;
pub mod config;
pub mod connector;
pub mod gateway;
pub mod handlers;
pub mod lifecycle;
pub mod network;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use gateway::{Gateway, GatewayError};
pub use lifecycle::Shutdown;

/// Join error messages for aggregate errors.
pub(crate) fn join_errors<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
