//! The primary endpoint: `POST /api/topology/query`.
//!
//! Seeds a `RequestState` from the request body, invokes the compiled workflow
//! with a request-scoped deadline, and normalizes the orchestrator state into
//! the UI response. Partial orchestration is still a 200; only an unhandled
//! orchestrator failure becomes a 500.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use topology_agent::metrics::{TOPOLOGY_QUERY_FAILURE, TOPOLOGY_QUERY_SUCCESS};
use topology_agent::{
    Circuit, CommentHit, ImpactSummary, PathView, RequestState, UiContext,
};

use crate::app::AppState;
use crate::middleware::RequestId;

/// Request body for `/topology/query`.
#[derive(Debug, Deserialize)]
pub struct TopologyQueryRequest {
    /// Natural language topology / inventory question.
    pub query: String,
    /// Optional UI context (selected sites, filters, etc.).
    #[serde(default)]
    pub ui_context: Option<UiContext>,
    /// Optional chat/session identifier for continuity & memory.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// High-level response returned to the UI for a topology query.
#[derive(Debug, Serialize)]
pub struct TopologyResponse {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub view_type: String,
    pub summary: ImpactSummary,
    pub paths: Vec<PathView>,
    pub circuits: Vec<Circuit>,
    pub comments: Vec<CommentHit>,
    pub warnings: Vec<String>,
    pub partial: bool,
    pub natural_language_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_state: Option<serde_json::Value>,
}

pub async fn topology_query(
    State(app): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(payload): Json<TopologyQueryRequest>,
) -> Response {
    info!(request_id = %request_id, query = %payload.query, "topology_query_received");

    let mut state = RequestState::new(payload.query, request_id.clone());
    state.ui_context = payload.ui_context.unwrap_or_default();
    state.session_id = payload.session_id.clone();
    state.max_retries = app.resources.settings.max_plan_retries;

    // Request-scoped deadline: the token cancels in-flight tools cooperatively;
    // the correlator still runs and the response carries partial=true.
    let deadline = Duration::from_secs(app.resources.settings.request_timeout_secs);
    let token = state.cancel.clone();
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        token.cancel();
    });

    let result = app.resources.run_query(state).await;
    watchdog.abort();

    match result {
        Ok(final_state) => {
            TOPOLOGY_QUERY_SUCCESS.inc();
            info!(
                request_id = %request_id,
                partial = final_state.partial,
                "topology_query_completed"
            );
            let ui = final_state.ui_response;
            let body = TopologyResponse {
                request_id,
                session_id: payload.session_id,
                view_type: ui.view_type,
                summary: ui.summary,
                paths: ui.paths,
                circuits: ui.circuits,
                comments: ui.comments,
                warnings: ui.warnings,
                partial: ui.partial || final_state.partial,
                natural_language_summary: ui.natural_language_summary,
                raw_state: ui.debug_state,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            TOPOLOGY_QUERY_FAILURE.inc();
            error!(request_id = %request_id, error = %e, "topology_query_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "detail": "Failed to process topology query." })),
            )
                .into_response()
        }
    }
}
