//! Local relay proxy
//!
//! An axum server that accepts the client's connection settings with each
//! request, calls the vendor through a [`VendorClient`], and re-streams
//! completions as Server-Sent Events.
//!
//! | Route              | Purpose                                   |
//! |--------------------|-------------------------------------------|
//! | `GET /api/health`  | Liveness check                            |
//! | `POST /api/models` | Model listing, `{"models": [...]}`        |
//! | `POST /api/chat`   | Streaming completion as `text/event-stream` |

pub mod handlers;
pub mod wire;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::vendor::VendorClient;

/// Shared state of the relay handlers
pub struct AppState {
    /// Vendor used for every request
    pub vendor: Arc<dyn VendorClient>,
    /// Base URL used when a request does not name one
    pub default_base_url: String,
}

impl AppState {
    /// Create handler state
    pub fn new(vendor: Arc<dyn VendorClient>, default_base_url: impl Into<String>) -> Self {
        Self {
            vendor,
            default_base_url: default_base_url.into(),
        }
    }

    /// The request's base URL, or the default when absent or blank
    pub fn resolve_base_url(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.default_base_url)
            .to_string()
    }
}

/// Build the relay router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/models", post(handlers::models))
        .route("/api/chat", post(handlers::chat))
        .with_state(Arc::new(state))
}

/// Run the relay proxy until Ctrl-C
///
/// # Errors
///
/// Returns error if the configured address cannot be bound
pub async fn serve(config: &Config, vendor: Arc<dyn VendorClient>) -> Result<()> {
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Relay proxy listening on http://{}", listener.local_addr()?);

    let app = router(AppState::new(vendor, &config.upstream.default_base_url));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Relay proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Relay proxy running on an ephemeral loopback port inside this process
///
/// The server task is aborted when the handle is dropped.
#[derive(Debug)]
pub struct EmbeddedProxy {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl EmbeddedProxy {
    /// Bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the relay API, e.g. `http://127.0.0.1:54321/api`
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }
}

impl Drop for EmbeddedProxy {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start the relay proxy on `127.0.0.1:0` in a background task
///
/// # Errors
///
/// Returns error if no loopback port can be bound
pub async fn spawn_embedded(
    vendor: Arc<dyn VendorClient>,
    default_base_url: &str,
) -> Result<EmbeddedProxy> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let app = router(AppState::new(vendor, default_base_url));

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Embedded relay proxy failed: {}", e);
        }
    });

    tracing::debug!("Embedded relay proxy listening on http://{}", addr);
    Ok(EmbeddedProxy { addr, handle })
}
