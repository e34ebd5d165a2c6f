//! HTTP API server for the topology agent (axum).
//!
//! One primary endpoint (`POST /api/topology/query`) plus system companions
//! (`/health`, `/ready`, `/version`, `/metrics`). Correlation ids arrive via
//! `X-Request-ID` and are echoed back; per-route Prometheus metrics are
//! recorded by middleware.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`].

mod app;
mod middleware;
mod system;
mod topology;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use topology_agent::Resources;

pub use app::{router, AppState};

const DEFAULT_ADDR: &str = "0.0.0.0:8000";

/// Runs the HTTP server on an existing listener. Used by tests (bind to
/// 127.0.0.1:0 first, then pass the listener).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    resources: Arc<Resources>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("topology agent API listening on http://{}", addr);

    let state = Arc::new(AppState { resources });
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs the HTTP server. Listens on `addr` (default 0.0.0.0:8000).
pub async fn run_serve(
    addr: Option<&str>,
    resources: Arc<Resources>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, resources).await
}
