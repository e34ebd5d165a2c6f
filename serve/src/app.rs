//! Axum app: state and router.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use topology_agent::Resources;

use crate::middleware::request_context;
use crate::system::{health, metrics, ready, version};
use crate::topology::topology_query;

/// Shared handler state: the process-wide resources.
pub struct AppState {
    pub resources: Arc<Resources>,
}

/// Builds the router: the topology query endpoint under the configured API
/// prefix, system endpoints at the root, and the request-context middleware
/// (correlation id + per-route metrics) around everything.
pub fn router(state: Arc<AppState>) -> Router {
    let api_prefix = state
        .resources
        .settings
        .api_prefix
        .trim_end_matches('/')
        .to_string();

    Router::new()
        .route(
            &format!("{}/topology/query", api_prefix),
            post(topology_query),
        )
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .route("/metrics", get(metrics))
        .layer(axum::middleware::from_fn(request_context))
        .with_state(state)
}
