//! Memory search tool: ranked prior-session snippets.
//!
//! Searches the chat embedding table scoped to the current session id. Without
//! a session or a vector store the tool returns an empty snippet list.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::vector::VectorClient;
use crate::embedding::Embedder;
use crate::error::AgentError;
use crate::state::{RequestState, ToolEnvelope, ToolKind};
use crate::tools::{string_param, usize_param, ResolvedParams, Tool};

const DEFAULT_TOP_K: usize = 3;

pub struct MemorySearchTool {
    vector: Option<Arc<VectorClient>>,
    embedder: Arc<dyn Embedder>,
}

impl MemorySearchTool {
    pub fn new(vector: Option<Arc<VectorClient>>, embedder: Arc<dyn Embedder>) -> Self {
        Self { vector, embedder }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::MemorySearch
    }

    async fn call(
        &self,
        params: &ResolvedParams,
        state: &RequestState,
    ) -> Result<ToolEnvelope, AgentError> {
        let session_id = state.session_id.clone();
        let top_k = usize_param(params, "top_k").unwrap_or(DEFAULT_TOP_K);
        let query_text = string_param(params, "query_text")
            .unwrap_or_else(|| state.user_input.trim().to_string());

        let (Some(vector), Some(session_id)) = (&self.vector, &session_id) else {
            return Ok(ToolEnvelope::ok(
                serde_json::json!({ "snippets": [] }),
                serde_json::json!({
                    "source": "memory_tool_stub",
                    "session_id": session_id,
                }),
            ));
        };

        if query_text.is_empty() {
            return Ok(ToolEnvelope::ok(
                serde_json::json!({ "snippets": [] }),
                serde_json::json!({
                    "source": "memory_tool",
                    "session_id": session_id,
                    "reason": "empty query_text",
                }),
            ));
        }

        let embedding = self.embedder.embed(&query_text).await?;
        let hits = vector
            .search_chat_embeddings(Some(session_id), &embedding, top_k as i64)
            .await?;

        let snippets: Vec<serde_json::Value> = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "id": hit.id,
                    "distance": hit.distance,
                    "metadata": hit.metadata,
                })
            })
            .collect();

        Ok(ToolEnvelope::ok(
            serde_json::json!({ "snippets": snippets }),
            serde_json::json!({
                "source": "memory_chat_pgvector",
                "session_id": session_id,
                "num_results": snippets.len(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    /// **Scenario**: no vector store or no session id returns the stub envelope.
    #[tokio::test]
    async fn stub_without_store_or_session() {
        let tool = MemorySearchTool::new(None, Arc::new(HashEmbedder::default()));
        let mut state = RequestState::new("what did we find yesterday", "req");
        state.session_id = Some("sess-1".into());

        let envelope = tool.call(&ResolvedParams::new(), &state).await.unwrap();
        assert_eq!(envelope.metadata["source"], "memory_tool_stub");
        assert_eq!(envelope.payload["snippets"], serde_json::json!([]));
    }
}
