//! Hierarchy tool: parent/child relations for sites and circuits.
//!
//! Thin adapter over the hierarchy REST client. Sites come from params or
//! `ui_context.selected_sites`; circuit ids usually arrive via `$ref` from the
//! inventory step. Without a configured client the tool returns a stub envelope.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::clients::hierarchy::HierarchyClient;
use crate::error::AgentError;
use crate::state::{RequestState, ToolEnvelope, ToolKind};
use crate::tools::{string_list, ResolvedParams, Tool};

pub struct HierarchyTool {
    client: Option<Arc<HierarchyClient>>,
}

impl HierarchyTool {
    pub fn new(client: Option<Arc<HierarchyClient>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for HierarchyTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Hierarchy
    }

    async fn call(
        &self,
        params: &ResolvedParams,
        state: &RequestState,
    ) -> Result<ToolEnvelope, AgentError> {
        let Some(client) = &self.client else {
            return Ok(ToolEnvelope::ok(
                serde_json::json!({ "hierarchies": [] }),
                serde_json::json!({
                    "source": "hierarchy_tool_stub",
                    "reason": "hierarchy API not configured",
                }),
            ));
        };

        let mut site_names = string_list(params, "site_names");
        if site_names.is_empty() {
            site_names = state.ui_context.selected_sites.clone();
        }
        let circuit_ids = string_list(params, "circuit_ids");

        let mut hierarchies: Vec<serde_json::Value> = Vec::new();
        let mut fetch_errors: Vec<String> = Vec::new();

        for site in &site_names {
            match client.site_hierarchy(site).await {
                Ok(data) => hierarchies.push(serde_json::json!({
                    "kind": "site",
                    "id": site,
                    "hierarchy": data,
                })),
                Err(e) => fetch_errors.push(format!("site {}: {}", site, e)),
            }
        }
        for circuit_id in &circuit_ids {
            match client.circuit_hierarchy(circuit_id).await {
                Ok(data) => hierarchies.push(serde_json::json!({
                    "kind": "circuit",
                    "id": circuit_id,
                    "hierarchy": data,
                })),
                Err(e) => fetch_errors.push(format!("circuit {}: {}", circuit_id, e)),
            }
        }

        // All lookups failing is a transient fault worth retrying; partial
        // failures are recorded and the rest of the data flows on.
        if hierarchies.is_empty() && !fetch_errors.is_empty() {
            warn!(errors = fetch_errors.len(), "hierarchy fetches all failed");
            return Err(AgentError::Http(
                fetch_errors.into_iter().next().unwrap_or_default(),
            ));
        }

        Ok(ToolEnvelope::ok(
            serde_json::json!({ "hierarchies": hierarchies }),
            serde_json::json!({
                "source": "hierarchy_api",
                "num_hierarchies": hierarchies.len(),
                "fetch_errors": fetch_errors,
            }),
        ))
    }
}
