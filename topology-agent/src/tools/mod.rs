//! Tool adapters: uniform async callables over the data plane.
//!
//! Each tool reads its resolved params (the executor substitutes `$ref` tokens
//! before the adapter is entered) plus the request state, and returns a
//! [`ToolEnvelope`]. Missing drivers yield stub envelopes with a `reason`;
//! driver errors yield empty payloads with the error recorded in metadata.
//! `Err` is reserved for transient faults the executor should retry.

pub mod comments;
pub mod hierarchy;
pub mod inventory;
pub mod memory;
pub mod outage;
pub mod topology;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::state::{RequestState, ToolEnvelope, ToolKind};

/// Step params after reference resolution: plain JSON values only.
pub type ResolvedParams = BTreeMap<String, serde_json::Value>;

/// One tool behind the executor.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which plan tool name this adapter serves.
    fn kind(&self) -> ToolKind;

    /// Executes the tool. `Err` means a transient fault (retried, counted by the
    /// circuit breaker); degraded-but-answered cases return an `Ok` envelope.
    async fn call(
        &self,
        params: &ResolvedParams,
        state: &RequestState,
    ) -> Result<ToolEnvelope, AgentError>;
}

/// Registry of tool adapters, keyed by plan tool name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.kind(), tool);
        self
    }

    pub fn get(&self, kind: ToolKind) -> Option<Arc<dyn Tool>> {
        self.tools.get(&kind).cloned()
    }
}

/// String-list param: accepts an array of strings or a single string.
pub fn string_list(params: &ResolvedParams, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// String param, trimmed; `None` when absent or empty.
pub fn string_param(params: &ResolvedParams, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Unsigned integer param.
pub fn usize_param(params: &ResolvedParams, key: &str) -> Option<usize> {
    params.get(key).and_then(|v| v.as_u64()).map(|v| v as usize)
}
