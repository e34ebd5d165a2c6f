//! Workflow wiring: the fixed topology-query graph.
//!
//! ```text
//! START → ingress → planner → executor → correlate_validate
//!                      ↑                        ↓ (refinement router)
//!                      └──── planner  |  respond → END
//! ```
//!
//! The refinement router is the only backward edge: it re-enters the planner
//! when the validator requested refinement and retries remain. The planner
//! increments `retry_count` when it runs on that edge, so `retry_count ≤
//! max_retries` holds by construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use env_config::Settings;

use crate::correlate::CorrelateValidateNode;
use crate::error::AgentError;
use crate::executor::breaker::CircuitBreaker;
use crate::executor::ExecutorNode;
use crate::gateway::Gateway;
use crate::graph::{CompilationError, CompiledStateGraph, Node, StateGraph, END, START};
use crate::metrics::{NODE_INVOCATIONS, NODE_LATENCY};
use crate::planner::PlannerNode;
use crate::respond::ResponseNode;
use crate::state::RequestState;
use crate::tools::ToolRegistry;

/// Normalizes the seeded request state: defaults for history containers and the
/// retry budget, so downstream nodes never special-case missing fields.
pub struct IngressNode {
    settings: Arc<Settings>,
}

impl IngressNode {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Node<RequestState> for IngressNode {
    fn id(&self) -> &str {
        "ingress"
    }

    async fn run(&self, mut state: RequestState) -> Result<RequestState, AgentError> {
        let start = Instant::now();
        info!(
            request_id = %state.request_id,
            node = "ingress",
            user_input = %state.user_input,
            "node_start"
        );

        if state.max_retries == 0 {
            state.max_retries = self.settings.max_plan_retries;
        }
        state.retry_count = 0;

        NODE_INVOCATIONS.with_label_values(&["ingress", "ok"]).inc();
        NODE_LATENCY
            .with_label_values(&["ingress"])
            .observe(start.elapsed().as_secs_f64());
        Ok(state)
    }
}

/// Wraps the planner to count the backward edge: entering the planner with a
/// pending refinement request is the loop, and it consumes one retry.
struct RefiningPlanner {
    inner: PlannerNode,
}

#[async_trait]
impl Node<RequestState> for RefiningPlanner {
    fn id(&self) -> &str {
        "planner"
    }

    async fn run(&self, mut state: RequestState) -> Result<RequestState, AgentError> {
        if state.validation.needs_refinement {
            state.retry_count += 1;
            info!(
                request_id = %state.request_id,
                retry_count = state.retry_count,
                "planner re-entry for refinement"
            );
        }
        self.inner.run(state).await
    }
}

/// Decides whether to refine (back to planner) or move to response. Bounded by
/// `max_retries` so the loop cannot run away.
fn refinement_router(state: &RequestState) -> String {
    if state.validation.needs_refinement && state.retry_count < state.max_retries {
        "planner".to_string()
    } else {
        "respond".to_string()
    }
}

/// Builds and compiles the workflow graph from its collaborators.
pub fn build_workflow(
    gateway: Arc<Gateway>,
    settings: Arc<Settings>,
    tools: Arc<ToolRegistry>,
    breaker: Arc<CircuitBreaker>,
) -> Result<CompiledStateGraph<RequestState>, CompilationError> {
    let mut graph = StateGraph::<RequestState>::new();

    graph.add_node("ingress", Arc::new(IngressNode::new(settings.clone())));
    graph.add_node(
        "planner",
        Arc::new(RefiningPlanner {
            inner: PlannerNode::new(gateway.clone()),
        }),
    );
    graph.add_node(
        "executor",
        Arc::new(ExecutorNode::new(tools, breaker, settings.clone())),
    );
    graph.add_node(
        "correlate_validate",
        Arc::new(CorrelateValidateNode::new(gateway.clone(), settings.clone())),
    );
    graph.add_node("respond", Arc::new(ResponseNode::new(gateway, settings)));

    graph.add_edge(START, "ingress");
    graph.add_edge("ingress", "planner");
    graph.add_edge("planner", "executor");
    graph.add_edge("executor", "correlate_validate");
    graph.add_conditional_edges(
        "correlate_validate",
        Arc::new(refinement_router),
        Some(HashMap::from([
            ("planner".to_string(), "planner".to_string()),
            ("respond".to_string(), "respond".to_string()),
        ])),
    );
    graph.add_edge("respond", END);

    graph.compile()
}
