//! Prometheus metrics for the orchestrator and the HTTP layer.
//!
//! Registered on the default registry; serve renders them at `/metrics`.
//! Node/tool counters are labeled by name and status so dashboards can derive
//! error rates per stage.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

/// Per-node invocation counter, labeled `node` and `status` (ok/error).
pub static NODE_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "topology_node_invocations_total",
        "Number of workflow node executions",
        &["node", "status"]
    )
    .expect("register topology_node_invocations_total")
});

/// Per-node latency histogram in seconds.
pub static NODE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "topology_node_latency_seconds",
        "Workflow node latency in seconds",
        &["node"]
    )
    .expect("register topology_node_latency_seconds")
});

/// Per-tool invocation counter, labeled `tool` and `status` (ok/error/skipped).
pub static TOOL_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "topology_tool_invocations_total",
        "Number of tool executions",
        &["tool", "status"]
    )
    .expect("register topology_tool_invocations_total")
});

/// Per-tool latency histogram in seconds.
pub static TOOL_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "topology_tool_latency_seconds",
        "Tool call latency in seconds",
        &["tool"]
    )
    .expect("register topology_tool_latency_seconds")
});

/// End-to-end successful topology queries.
pub static TOPOLOGY_QUERY_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "topology_query_success_total",
        "Number of successful topology queries (end-to-end)"
    )
    .expect("register topology_query_success_total")
});

/// End-to-end failed topology queries (unhandled orchestrator errors).
pub static TOPOLOGY_QUERY_FAILURE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "topology_query_failure_total",
        "Number of failed topology queries (unhandled errors or invalid response)"
    )
    .expect("register topology_query_failure_total")
});

/// Times the planner fell back to the deterministic plan.
pub static PLANNER_FALLBACK_USED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "topology_planner_fallback_total",
        "Number of times the planner fell back to a simple plan (LLM output invalid)"
    )
    .expect("register topology_planner_fallback_total")
});

/// Queries where comment RAG returned at least one result.
pub static COMMENT_RAG_HIT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "topology_comment_rag_hit_total",
        "Number of queries where comment RAG returned at least one result"
    )
    .expect("register topology_comment_rag_hit_total")
});

/// Queries where comment RAG returned zero results.
pub static COMMENT_RAG_MISS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "topology_comment_rag_miss_total",
        "Number of queries where comment RAG returned zero results"
    )
    .expect("register topology_comment_rag_miss_total")
});

/// HTTP requests by path, method, and status; incremented by serve middleware.
pub static API_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "topology_api_requests_total",
        "Total number of HTTP requests received by the API",
        &["path", "method", "status"]
    )
    .expect("register topology_api_requests_total")
});

/// HTTP request latency by path and method.
pub static API_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "topology_api_request_duration_seconds",
        "HTTP request latency in seconds",
        &["path", "method"]
    )
    .expect("register topology_api_request_duration_seconds")
});
