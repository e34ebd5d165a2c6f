//! Errors raised while compiling a StateGraph into an executable graph.

use thiserror::Error;

/// Graph wiring problems caught at compile time, before any request runs.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// An edge references a node id that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge from START.
    #[error("graph has no START edge")]
    MissingStart,

    /// No path reaches END.
    #[error("graph has no END edge")]
    MissingEnd,

    /// A conditional path map points at an unknown node.
    #[error("conditional path map references unknown node: {0}")]
    InvalidConditionalPathMap(String),

    /// A node has both an unconditional edge and conditional edges.
    #[error("node has both an edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),

    /// The edges do not form a valid chain (branching or a cycle without a router).
    #[error("invalid chain: {0}")]
    InvalidChain(String),
}
