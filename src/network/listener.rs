//! Bound server with graceful shutdown.
//!
//! # Responsibilities
//! - Bind to the configured address (port 0 allowed)
//! - Serve an axum router over plain TCP or rustls
//! - Drain in-flight connections on shutdown, up to a grace period

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::TlsConfig;
use crate::network::tls::load_tls_config;
use crate::network::NetworkError;

/// A server task plus the handle that stops it.
pub struct RunningServer {
    name: &'static str,
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
}

/// Bind `bind_address` and serve `router` in a background task.
pub async fn serve(
    name: &'static str,
    bind_address: &str,
    tls: Option<&TlsConfig>,
    router: Router,
) -> Result<RunningServer, NetworkError> {
    let bind_error = |source| NetworkError::Bind {
        address: bind_address.to_string(),
        source,
    };
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;
    let listener = listener.into_std().map_err(bind_error)?;

    let handle = Handle::new();
    let app = router.into_make_service();
    let task = match tls {
        Some(tls) => {
            let rustls = load_tls_config(tls).await.map_err(NetworkError::Tls)?;
            let server = axum_server::tls_rustls::from_tcp_rustls(listener, rustls).handle(handle.clone());
            tokio::spawn(async move { server.serve(app).await })
        }
        None => {
            let server = axum_server::from_tcp(listener).handle(handle.clone());
            tokio::spawn(async move { server.serve(app).await })
        }
    };

    tracing::info!(
        server = name,
        address = %local_addr,
        tls = tls.is_some(),
        "Server listening"
    );

    Ok(RunningServer {
        name,
        handle,
        task,
        local_addr,
    })
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, wait up to `grace` for open connections, then stop.
    pub async fn shutdown(self, grace: Duration) -> Result<(), NetworkError> {
        self.handle.graceful_shutdown(Some(grace));
        let result = match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NetworkError::Io(e)),
            Err(e) => Err(NetworkError::Task(e.to_string())),
        };
        tracing::info!(server = self.name, address = %self.local_addr, "Server stopped");
        result
    }
}
