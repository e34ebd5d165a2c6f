//! Thin clients over the external data plane: graph DB, inventory SQL,
//! pgvector embeddings, hierarchy REST API.
//!
//! Every client is optional at runtime; tools degrade to stub envelopes when a
//! client is absent and record driver errors in metadata instead of raising.

pub mod graph;
pub mod hierarchy;
pub mod inventory;
pub mod vector;
