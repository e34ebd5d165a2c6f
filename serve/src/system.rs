//! System endpoints: liveness, readiness, version, metrics.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prometheus::{Encoder, TextEncoder};

use crate::app::AppState;

/// Simple liveness check to verify the process is running.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: per-dependency checks (db, graph, redis). A load balancer
/// should use this to decide whether the instance can take traffic.
pub async fn ready(State(app): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(app.resources.readiness().await)
}

/// Build metadata: app name, crate version, deployment environment.
pub async fn version(State(app): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let settings = &app.resources.settings;
    Json(serde_json::json!({
        "app_name": settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "env": settings.env.as_str(),
    }))
}

/// Prometheus exposition for everything registered on the default registry.
pub async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode failed: {}", e),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
