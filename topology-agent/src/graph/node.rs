//! Graph node trait: one step in a StateGraph.
//!
//! Receives state `S`, returns updated `S`. Routing is decided by the graph's
//! edges and conditional routers, not by the node itself.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::AgentError;

/// One step in a graph: state in, state out.
///
/// Implemented by the workflow stages (ingress, planner, executor, correlate,
/// respond). The runner follows the linear edge or consults the source node's
/// conditional router to pick the next node.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Node id (e.g. `"planner"`). Must be unique within a graph.
    fn id(&self) -> &str;

    /// One step: state in, state out.
    async fn run(&self, state: S) -> Result<S, AgentError>;
}
