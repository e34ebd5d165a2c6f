//! Orchestration error types.
//!
//! Used by graph nodes, the gateway, and tool adapters. The propagation policy is
//! "surface partial, never fail": most failures end up inside a `ToolEnvelope` or a
//! warning, and only errors the orchestrator cannot describe escape as `AgentError`.

use thiserror::Error;

/// Orchestration error.
///
/// Returned by `Node::run` and the gateway when a stage fails outright. Tool-level
/// failures never use this type on the success path; they are recorded inline in
/// envelopes so correlation can mark the response partial.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Plan could not be produced or validated (the planner converts most of these
    /// into a fallback plan before they propagate).
    #[error("planning failed: {0}")]
    Plan(String),

    /// Gateway failure: unknown backend, handle creation, or a model call that
    /// could not be issued at all.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Tool adapter failure that escaped the envelope path.
    #[error("tool error: {0}")]
    Tool(String),

    /// Graph driver failure (invalid wiring, runaway loop).
    #[error("graph error: {0}")]
    Graph(String),

    /// Usage store or other persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// Outbound HTTP failure (hierarchy API, rerank endpoint).
    #[error("http error: {0}")]
    Http(String),

    /// The enclosing request was cancelled or timed out.
    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Store(e.to_string())
    }
}
