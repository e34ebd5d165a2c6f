//! State graph: nodes + explicit edges and conditional routing, compile and invoke.
//!
//! One shared state type flows through the nodes (state-in, state-out). Build with
//! `add_node` / `add_edge(from, to)` using `START` and `END`, add conditional edges
//! for state-based routing, then `compile()` to get an executable graph.

mod compile_error;
mod compiled;
mod node;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::CompiledStateGraph;
pub use node::Node;
pub use state_graph::{ConditionalRouterFn, StateGraph, END, START};
