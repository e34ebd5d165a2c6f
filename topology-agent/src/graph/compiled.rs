//! Executable graph produced by `StateGraph::compile`.
//!
//! `invoke` runs nodes from the START edge, following unconditional edges or
//! consulting the source node's conditional router, until END. A step ceiling
//! bounds conditional loops (e.g. planner refinement) so a misbehaving router
//! cannot spin forever.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AgentError;
use crate::graph::node::Node;
use crate::graph::state_graph::{ConditionalRouter, END};

/// Hard ceiling on node executions per invoke. The topology workflow runs five
/// nodes plus at most `max_retries` refinement loops, so this is generous.
const MAX_STEPS: usize = 64;

pub(crate) enum NextEntry<S> {
    Unconditional(String),
    Conditional(ConditionalRouter<S>),
}

/// Compiled, immutable graph ready for `invoke`.
pub struct CompiledStateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    first_node_id: String,
    next_map: HashMap<String, NextEntry<S>>,
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        first_node_id: String,
        next_map: HashMap<String, NextEntry<S>>,
    ) -> Self {
        Self {
            nodes,
            first_node_id,
            next_map,
        }
    }

    /// Runs the graph to END and returns the final state.
    ///
    /// Node errors propagate as-is; an unknown next id or a run past the step
    /// ceiling is an `AgentError::Graph`.
    pub async fn invoke(&self, state: S) -> Result<S, AgentError> {
        let mut current_id = self.first_node_id.clone();
        let mut state = state;
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > MAX_STEPS {
                warn!(node = %current_id, steps, "graph step ceiling reached");
                return Err(AgentError::Graph(format!(
                    "step ceiling ({}) reached at node {}",
                    MAX_STEPS, current_id
                )));
            }

            let node = self.nodes.get(&current_id).ok_or_else(|| {
                AgentError::Graph(format!("node not found at runtime: {}", current_id))
            })?;

            debug!(node = %current_id, step = steps, "node_start");
            state = node.run(state).await?;
            debug!(node = %current_id, step = steps, "node_end");

            let next = match self.next_map.get(&current_id) {
                None => END.to_string(),
                Some(NextEntry::Unconditional(to)) => to.clone(),
                Some(NextEntry::Conditional(router)) => {
                    let key = (router.path)(&state);
                    match &router.path_map {
                        Some(map) => map.get(&key).cloned().unwrap_or(key),
                        None => key,
                    }
                }
            };

            if next == END {
                return Ok(state);
            }
            if !self.nodes.contains_key(&next) {
                return Err(AgentError::Graph(format!(
                    "router selected unknown node: {}",
                    next
                )));
            }
            current_id = next;
        }
    }
}
