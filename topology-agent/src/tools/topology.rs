//! Topology tool: path queries against the graph store.
//!
//! Given `{query_type, sites, layer, depth, filters}`, runs a shortest- or
//! all-shortest-path query between the first two sites. Site names fall back to
//! `ui_context.selected_sites`. With no graph client or fewer than two sites the
//! tool returns a stub envelope; driver errors degrade to empty paths with the
//! error recorded in metadata.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::clients::graph::GraphClient;
use crate::error::AgentError;
use crate::state::{RequestState, ToolEnvelope, ToolKind};
use crate::tools::{string_list, string_param, usize_param, ResolvedParams, Tool};

const DEFAULT_DEPTH: usize = 4;

pub struct TopologyTool {
    graph: Option<Arc<GraphClient>>,
}

impl TopologyTool {
    pub fn new(graph: Option<Arc<GraphClient>>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for TopologyTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Topology
    }

    async fn call(
        &self,
        params: &ResolvedParams,
        state: &RequestState,
    ) -> Result<ToolEnvelope, AgentError> {
        let mut sites = string_list(params, "sites");
        if sites.is_empty() {
            sites = state.ui_context.selected_sites.clone();
        }
        let layer = string_param(params, "layer")
            .or_else(|| state.ui_context.layer.clone())
            .unwrap_or_else(|| "L2".to_string());
        let query_type = string_param(params, "query_type").unwrap_or_else(|| "path".to_string());
        let depth = usize_param(params, "depth").unwrap_or(DEFAULT_DEPTH);

        let Some(graph) = &self.graph else {
            return Ok(stub(state, "graph client not configured"));
        };
        if sites.len() < 2 {
            return Ok(stub(state, "insufficient sites: need a source and a destination"));
        }

        let src_site = sites[0].clone();
        let dst_site = sites[1].clone();

        let result = match query_type.as_str() {
            "path" => graph.shortest_path(&src_site, &dst_site, depth).await,
            // adjacency / neighbors / subgraph widen to every shortest route
            _ => graph.all_shortest_paths(&src_site, &dst_site, depth).await,
        };

        let hop_lists = match result {
            Ok(hop_lists) => hop_lists,
            Err(e) => {
                warn!(src = %src_site, dst = %dst_site, error = %e, "graph query degraded");
                return Ok(ToolEnvelope::ok(
                    serde_json::json!({ "paths": [], "device_ids": [] }),
                    serde_json::json!({
                        "source": "topology_tool_graph_error",
                        "error": e.to_string(),
                        "query_summary":
                            format!("Failed to fetch path for {} -> {}", src_site, dst_site),
                    }),
                ));
            }
        };

        let paths: Vec<serde_json::Value> = hop_lists
            .iter()
            .map(|hops| {
                serde_json::json!({
                    "src_site": src_site,
                    "dst_site": dst_site,
                    "layer": layer,
                    "hops": hops,
                })
            })
            .collect();

        // Hop ids double as device ids for downstream $ref consumers.
        let mut device_ids: Vec<String> = Vec::new();
        for hops in &hop_lists {
            for hop in hops {
                if !device_ids.contains(hop) {
                    device_ids.push(hop.clone());
                }
            }
        }

        Ok(ToolEnvelope::ok(
            serde_json::json!({ "paths": paths, "device_ids": device_ids }),
            serde_json::json!({
                "source": "topology_graph_db",
                "src_site": src_site,
                "dst_site": dst_site,
                "layer": layer,
                "num_paths": paths.len(),
            }),
        ))
    }
}

fn stub(state: &RequestState, reason: &str) -> ToolEnvelope {
    ToolEnvelope::ok(
        serde_json::json!({ "paths": [], "device_ids": [] }),
        serde_json::json!({
            "source": "topology_tool_stub",
            "reason": reason,
            "query_summary": format!("Stub topology result for: {}", state.user_input),
        }),
    )
}
