//! # Topology Agent
//!
//! A natural-language query service core for a heterogeneous network-operations
//! data plane, built on a **state-in, state-out** design: one [`RequestState`]
//! flows through a fixed [`StateGraph`] of nodes, with a single backward edge
//! for planner refinement.
//!
//! ## Pipeline
//!
//! - [`planner`]: LLM planner emitting a typed step DAG ([`Plan`], [`Step`],
//!   `$ref` dataflow as [`ParamValue::Ref`]); deterministic fallback plan on any
//!   parse or validation failure.
//! - [`executor`]: DAG executor honoring `depends_on`, parallel groups, per-tool
//!   retries, a circuit-breaker registry, and request cancellation; every tool
//!   writes a uniform [`ToolEnvelope`].
//! - [`correlate`]: merges envelopes into the impact view (alarms onto circuits
//!   and paths), flags partial results, optionally consults an LLM judge.
//! - [`respond`]: polishes the natural-language summary, preserving the
//!   deterministic draft on failure.
//! - [`gateway`]: one funnel for every model call: budget enforcement with
//!   backend degradation, PII/injection input guardrails, JSON/RBAC output
//!   guardrails, usage accounting to a JSONL log + checkpoint.
//!
//! ## Shared infrastructure
//!
//! - [`graph`]: minimal state-graph machinery (nodes, edges, conditional
//!   routing, compile-time validation).
//! - [`tools`]: the six adapters over graph DB / inventory SQL / pgvector
//!   comment search / outage feed / hierarchy API / session memory.
//! - [`clients`]: thin drivers (neo4rs, sqlx Postgres, reqwest, redis cache).
//! - [`resources`]: process-wide pools, breaker registry, usage store, and the
//!   compiled workflow behind [`Resources::run_query`].
//!
//! The propagation policy everywhere is **surface partial, never fail**:
//! anything describable with a warning comes back as a well-formed response
//! with `partial = true`.

pub mod clients;
pub mod correlate;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod graph;
pub mod message;
pub mod metrics;
pub mod planner;
pub mod resources;
pub mod respond;
pub mod state;
pub mod tools;
pub mod workflow;

pub use error::AgentError;
pub use gateway::{Gateway, ModelTier, TrackingTags};
pub use graph::{CompilationError, CompiledStateGraph, Node, StateGraph, END, START};
pub use message::ChatMessage;
pub use resources::Resources;
pub use state::{
    Alarm, Circuit, CommentHit, ImpactSummary, ParamValue, PathView, Plan, RequestState, Step,
    ToolEnvelope, ToolKind, UiContext, UiResponse, Validation, ValidationStatus,
};
pub use workflow::build_workflow;
