//! Inventory tool: circuits and sites from the relational inventory.
//!
//! Resolves circuits by explicit ids when a prior step provided them, otherwise
//! between the first two site names (params, then `ui_context.selected_sites`).
//! Parameter shortfalls return an empty result with a `reason` instead of
//! failing the step.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::inventory::InventoryClient;
use crate::error::AgentError;
use crate::state::{RequestState, ToolEnvelope, ToolKind};
use crate::tools::{string_list, string_param, ResolvedParams, Tool};

const CIRCUIT_LIMIT: i64 = 500;

pub struct InventoryTool {
    inventory: Option<Arc<InventoryClient>>,
}

impl InventoryTool {
    pub fn new(inventory: Option<Arc<InventoryClient>>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for InventoryTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Inventory
    }

    async fn call(
        &self,
        params: &ResolvedParams,
        state: &RequestState,
    ) -> Result<ToolEnvelope, AgentError> {
        let circuit_ids = string_list(params, "circuit_ids");
        let mut site_names = string_list(params, "site_names");
        if site_names.is_empty() {
            site_names = state.ui_context.selected_sites.clone();
        }
        let layer = string_param(params, "layer").or_else(|| state.ui_context.layer.clone());

        let Some(inventory) = &self.inventory else {
            return Ok(empty(
                "inventory_tool",
                "inventory database not configured",
            ));
        };

        if circuit_ids.is_empty() && site_names.len() < 2 {
            return Ok(empty(
                "inventory_tool",
                "insufficient parameters: need circuit ids or two site names",
            ));
        }

        let circuits = if !circuit_ids.is_empty() {
            inventory.circuits_by_ids(&circuit_ids).await?
        } else {
            inventory
                .circuits_by_sites(
                    &site_names[0],
                    &site_names[1],
                    layer.as_deref(),
                    CIRCUIT_LIMIT,
                )
                .await?
        };

        let sites = if site_names.is_empty() {
            Vec::new()
        } else {
            inventory.sites_by_ids(&site_names).await?
        };

        let resolved_circuit_ids: Vec<String> = circuits
            .iter()
            .filter_map(|c| c.get("circuit_id").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();

        Ok(ToolEnvelope::ok(
            serde_json::json!({
                "circuits": circuits,
                "sites": sites,
                "circuit_ids": resolved_circuit_ids,
            }),
            serde_json::json!({
                "source": "inventory_db",
                "num_circuits": circuits.len(),
                "num_sites": sites.len(),
                "layer": layer,
            }),
        ))
    }
}

fn empty(source: &str, reason: &str) -> ToolEnvelope {
    ToolEnvelope::ok(
        serde_json::json!({ "circuits": [], "sites": [], "circuit_ids": [] }),
        serde_json::json!({ "source": source, "reason": reason }),
    )
}
