//! User request dispatch.
//!
//! # Data Flow
//! ```text
//! raw bytes
//!     → decode_request (parse error → -32700 / 400)
//!     → Codec::decode_envelope
//!         Legacy  → validate → handler by routing key
//!         JsonRpc → service name → routing key → handler
//!     → handler accepts the request with a fresh Callback (bounded by the deadline)
//!     → wait for the callback until the deadline
//!     → (body, status)
//! ```
//!
//! Every call records exactly one outcome on the metrics sink.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::time::{timeout_at, Instant};

use crate::api::jsonrpc::decode_request;
use crate::api::{Codec, Envelope, ErrorCode, Response};
use crate::handlers::{new_callback, CallbackError, Handler};
use crate::network::RequestProcessor;
use crate::observability::MetricsSink;

pub struct Dispatcher {
    codec: Arc<dyn Codec>,
    /// Routing key → handler, ordered by routing key.
    handlers: BTreeMap<String, Arc<dyn Handler>>,
    /// Service name → routing key.
    service_index: HashMap<String, String>,
    metrics: Arc<dyn MetricsSink>,
}

impl Dispatcher {
    pub fn new(
        codec: Arc<dyn Codec>,
        handlers: BTreeMap<String, Arc<dyn Handler>>,
        service_index: HashMap<String, String>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            codec,
            handlers,
            service_index,
            metrics,
        }
    }

    pub fn handlers(&self) -> &BTreeMap<String, Arc<dyn Handler>> {
        &self.handlers
    }

    pub async fn process_request(&self, raw: &[u8], auth: &str, deadline: Instant) -> (Vec<u8>, StatusCode) {
        let request = match decode_request(raw, auth) {
            Ok(request) => request,
            Err(e) => return self.error_response("", &e.to_string(), ErrorCode::UserMessageParseError),
        };
        let id = request.id.clone();

        let envelope = match self.codec.decode_envelope(request) {
            Ok(envelope) => envelope,
            Err(e) => return self.error_response(&id, &e.to_string(), ErrorCode::UserMessageParseError),
        };

        let (callback, waiter) = new_callback();
        let accepted = match envelope {
            Envelope::Legacy(mut message) => {
                if let Err(e) = self.codec.validate(&mut message) {
                    return self.error_response(&id, &e.to_string(), ErrorCode::UserMessageParseError);
                }
                let routing_key = message.body.routing_key.clone();
                let Some(handler) = self.handlers.get(&routing_key) else {
                    return self.error_response(
                        &id,
                        &format!("Unsupported routing key or handler: {}", routing_key),
                        ErrorCode::UnsupportedRoutingKeyError,
                    );
                };
                tracing::debug!(
                    request_id = %id,
                    routing_key = %routing_key,
                    sender = %message.body.sender,
                    "Dispatching legacy request"
                );
                timeout_at(deadline, handler.handle_legacy_user_message(message, callback)).await
            }
            Envelope::JsonRpc(request) => {
                let service = request.service_name().to_string();
                let Some(routing_key) = self.service_index.get(&service) else {
                    return self.error_response(
                        &id,
                        &format!("Service name not found: {}", service),
                        ErrorCode::UnsupportedMethodError,
                    );
                };
                let Some(handler) = self.handlers.get(routing_key) else {
                    return self.error_response(
                        &id,
                        &format!("Unsupported routing key or handler: {}", routing_key),
                        ErrorCode::UnsupportedRoutingKeyError,
                    );
                };
                tracing::debug!(
                    request_id = %id,
                    routing_key = %routing_key,
                    method = %request.method,
                    "Dispatching request"
                );
                timeout_at(deadline, handler.handle_jsonrpc_user_message(request, callback)).await
            }
        };

        match accepted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(request_id = %id, error = %e, "Handler rejected request");
                return self.error_response(&id, &e.to_string(), ErrorCode::HandlerError);
            }
            Err(_) => {
                tracing::debug!(request_id = %id, "Handler did not accept request before the deadline");
                return self.error_response(
                    &id,
                    &format!("handler timeout: {}", CallbackError::DeadlineExceeded),
                    ErrorCode::RequestTimeoutError,
                );
            }
        }

        match waiter.wait(deadline).await {
            Ok(payload) => {
                self.metrics.record_request(payload.error_code);
                (payload.raw_response, payload.error_code.to_http_status())
            }
            Err(e) => {
                tracing::debug!(request_id = %id, error = %e, "Request timed out");
                self.error_response(&id, &format!("handler timeout: {}", e), ErrorCode::RequestTimeoutError)
            }
        }
    }

    fn error_response(&self, id: &str, message: &str, code: ErrorCode) -> (Vec<u8>, StatusCode) {
        self.metrics.record_request(code);
        let response = Response::failure(id, code.to_jsonrpc_code(), message);
        let body = serde_json::to_vec(&response)
            .unwrap_or_else(|e| format!("fatal error: {}", e).into_bytes());
        (body, code.to_http_status())
    }
}

#[async_trait]
impl RequestProcessor for Dispatcher {
    async fn process_request(&self, raw: &[u8], auth: &str, deadline: Instant) -> (Vec<u8>, StatusCode) {
        Dispatcher::process_request(self, raw, auth, deadline).await
    }
}
