//! Request-context middleware: correlation ids and per-route HTTP metrics.
//!
//! Honors an incoming `X-Request-ID` header, generates one otherwise, exposes
//! it to handlers via an extension, and echoes it on the response. Every
//! request increments `topology_api_requests_total{path,method,status}` and
//! observes `topology_api_request_duration_seconds{path,method}`.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;
use uuid::Uuid;

use topology_agent::metrics::{API_REQUESTS, API_REQUEST_DURATION};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id for the current request, readable by handlers.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let path = request.uri().path().to_string();
    let method = request.method().as_str().to_uppercase();
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    info!(request_id = %request_id, method = %method, path = %path, "http_request_start");
    let start = Instant::now();

    let mut response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    API_REQUESTS
        .with_label_values(&[&path, &method, &status])
        .inc();
    API_REQUEST_DURATION
        .with_label_values(&[&path, &method])
        .observe(start.elapsed().as_secs_f64());
    info!(request_id = %request_id, path = %path, status = %status, "http_request_end");

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
