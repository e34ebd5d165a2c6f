//! Request-scoped state that flows through the topology workflow.
//!
//! The serve layer seeds a subset of [`RequestState`]; nodes progressively enrich it.
//! One request owns one state; nothing here is shared across requests. The graph
//! driver passes it node to node with a single backward edge (planner re-entry on
//! refinement).

pub mod plan;
pub mod response;

use serde::{Deserialize, Serialize};

pub use plan::{ParamValue, Plan, Step, ToolKind};
pub use response::{
    Alarm, Circuit, CommentHit, ElementType, ImpactSummary, PathView, UiResponse,
};

/// Envelope error written when a breaker skipped the tool.
pub const ERR_CIRCUIT_BREAKER_OPEN: &str = "circuit_breaker_open";
/// Envelope error written when the request was cancelled or timed out mid-step.
pub const ERR_CANCELLED: &str = "cancelled";
/// Envelope error written for steps the RBAC guardrail rewrote to `unauthorized_tool`.
pub const ERR_UNAUTHORIZED: &str = "unauthorized_tool";

/// Uniform result of one tool invocation. Envelopes never raise; failures are
/// recorded inline so correlation can mark the response partial.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolEnvelope {
    /// Successful envelope with payload and metadata objects.
    pub fn ok(payload: serde_json::Value, metadata: serde_json::Value) -> Self {
        Self {
            payload,
            metadata,
            error: None,
        }
    }

    /// Failure envelope: empty payload, error string, source tag in metadata.
    pub fn failed(source: &str, error: impl Into<String>) -> Self {
        Self {
            payload: serde_json::json!({}),
            metadata: serde_json::json!({ "source": source }),
            error: Some(error.into()),
        }
    }

    /// A named field of the payload object, for `$ref` resolution.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.as_object().and_then(|o| o.get(name))
    }
}

/// Optional UI context sent by the frontend: selected sites, layer, filters.
/// Deliberately flexible; unknown filter keys pass through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiContext {
    #[serde(default)]
    pub selected_sites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<serde_json::Value>,
    #[serde(default)]
    pub filters: serde_json::Map<String, serde_json::Value>,
}

/// Validation verdict from the correlator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Ok,
    Partial,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub status: ValidationStatus,
    pub needs_refinement: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Shared state for one topology query, mutated only by the node currently
/// owning it and destroyed after the response is serialized.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestState {
    // Core input
    pub user_input: String,
    #[serde(default)]
    pub ui_context: UiContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Correlation id for logging/tracing, echoed in the HTTP response.
    pub request_id: String,

    // Conversation context
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
    #[serde(default)]
    pub semantic_memory: Vec<serde_json::Value>,

    // Retry / refinement tracking
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub max_retries: u32,

    // Planner output
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub plan_raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_error: Option<String>,

    // Tool results, one slot per tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_data: Option<ToolEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_data: Option<ToolEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_data: Option<ToolEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outage_data: Option<ToolEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy_data: Option<ToolEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_data: Option<ToolEnvelope>,

    // Validation / correlation
    #[serde(default)]
    pub validation: Validation,

    // Final UI payload
    #[serde(default)]
    pub ui_response: UiResponse,
    #[serde(default)]
    pub partial: bool,

    /// Request-scoped cancellation; clones share the token, so every stage and
    /// in-flight tool observes the same deadline. Not part of the wire state.
    #[serde(skip)]
    pub cancel: tokio_util::sync::CancellationToken,
}

impl RequestState {
    /// Seed state for a fresh request; everything else is filled by nodes.
    pub fn new(user_input: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            request_id: request_id.into(),
            max_retries: 1,
            ..Self::default()
        }
    }

    /// The state slot a tool writes its envelope into. `Unauthorized` has no slot;
    /// its envelope only exists in the executor's per-step map.
    pub fn slot_mut(&mut self, tool: ToolKind) -> Option<&mut Option<ToolEnvelope>> {
        match tool {
            ToolKind::Topology => Some(&mut self.topology_data),
            ToolKind::Inventory => Some(&mut self.inventory_data),
            ToolKind::CommentsSearch => Some(&mut self.comment_data),
            ToolKind::Outage => Some(&mut self.outage_data),
            ToolKind::Hierarchy => Some(&mut self.hierarchy_data),
            ToolKind::MemorySearch => Some(&mut self.memory_data),
            ToolKind::Unauthorized => None,
        }
    }

    /// Envelope slots with their human tool labels, for correlation warnings.
    pub fn envelopes(&self) -> [(&'static str, Option<&ToolEnvelope>); 6] {
        [
            ("topology", self.topology_data.as_ref()),
            ("inventory", self.inventory_data.as_ref()),
            ("comments", self.comment_data.as_ref()),
            ("outage", self.outage_data.as_ref()),
            ("hierarchy", self.hierarchy_data.as_ref()),
            ("memory", self.memory_data.as_ref()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: new() seeds input, request id, and the default retry budget.
    #[test]
    fn request_state_new_defaults() {
        let state = RequestState::new("show path", "req-1");
        assert_eq!(state.user_input, "show path");
        assert_eq!(state.request_id, "req-1");
        assert_eq!(state.max_retries, 1);
        assert_eq!(state.retry_count, 0);
        assert!(state.plan.is_empty());
        assert!(state.topology_data.is_none());
    }

    /// **Scenario**: each tool kind maps to its own slot; unauthorized has none.
    #[test]
    fn slot_mut_covers_all_tools() {
        let mut state = RequestState::new("q", "r");
        for tool in ToolKind::fallback_order() {
            let slot = state.slot_mut(tool).expect("slot for planned tool");
            *slot = Some(ToolEnvelope::ok(serde_json::json!({}), serde_json::json!({})));
        }
        assert!(state.slot_mut(ToolKind::Unauthorized).is_none());
        assert!(state.envelopes().iter().all(|(_, e)| e.is_some()));
    }

    /// **Scenario**: envelope field lookup reads payload object keys only.
    #[test]
    fn envelope_field_lookup() {
        let env = ToolEnvelope::ok(
            serde_json::json!({"device_ids": ["d1", "d2"]}),
            serde_json::json!({"source": "test"}),
        );
        assert!(env.field("device_ids").is_some());
        assert!(env.field("missing").is_none());

        let failed = ToolEnvelope::failed("outage_tool", ERR_CIRCUIT_BREAKER_OPEN);
        assert_eq!(failed.error.as_deref(), Some("circuit_breaker_open"));
        assert!(failed.field("anything").is_none());
    }
}
