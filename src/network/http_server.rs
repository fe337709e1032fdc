//! User-facing HTTP server.
//!
//! # Responsibilities
//! - Accept `POST <path>` with a JSON-RPC body
//! - Attach a request ID, trace every request, cap the body size
//! - Hand the body, the `Authorization` header and a deadline to the processor
//! - Answer with the processor's body and status as `application/json`

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::UserServerConfig;
use crate::network::listener::{self, RunningServer};
use crate::network::{HttpTransport, NetworkError, RequestProcessor};

/// State injected into the request handler.
#[derive(Clone)]
struct AppState {
    processor: Arc<dyn RequestProcessor>,
    request_timeout: Duration,
}

pub struct UserServer {
    config: UserServerConfig,
    processor: OnceLock<Arc<dyn RequestProcessor>>,
    running: Mutex<Option<RunningServer>>,
    port: AtomicU16,
}

impl UserServer {
    pub fn new(config: UserServerConfig) -> Self {
        Self {
            config,
            processor: OnceLock::new(),
            running: Mutex::new(None),
            port: AtomicU16::new(0),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(&self, processor: Arc<dyn RequestProcessor>) -> Router {
        let state = AppState {
            processor,
            request_timeout: Duration::from_millis(self.config.request_timeout_ms),
        };
        Router::new()
            .route(&self.config.path, post(user_request))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.config.max_request_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }
}

async fn user_request(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let deadline = Instant::now() + state.request_timeout;
    let (raw, status) = state.processor.process_request(&body, auth, deadline).await;

    tracing::debug!(
        request_id = %request_id,
        status = %status,
        bytes = raw.len(),
        "User request processed"
    );

    (status, [(header::CONTENT_TYPE, "application/json")], raw).into_response()
}

#[async_trait]
impl HttpTransport for UserServer {
    fn set_request_handler(&self, handler: Arc<dyn RequestProcessor>) {
        if self.processor.set(handler).is_err() {
            tracing::warn!("Request handler already set, keeping the first one");
        }
    }

    async fn start(&self) -> Result<(), NetworkError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(NetworkError::AlreadyStarted);
        }
        let processor = self.processor.get().cloned().ok_or(NetworkError::NoRequestHandler)?;

        let server = listener::serve(
            "user",
            &self.config.bind_address,
            self.config.tls.as_ref(),
            self.build_router(processor),
        )
        .await?;
        self.port.store(server.local_addr().port(), Ordering::Release);
        *running = Some(server);
        Ok(())
    }

    async fn close(&self) -> Result<(), NetworkError> {
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
}
