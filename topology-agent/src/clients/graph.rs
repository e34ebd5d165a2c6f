//! Graph database client for topology queries (Cypher).
//!
//! Wraps a neo4rs connection pool. The topology tool depends on this client
//! instead of the raw driver. Assumes a schema of `(:Site {id, name})` nodes
//! joined by `[:LINK]` relationships; adapt the Cypher here for other schemas.

use neo4rs::{query, Graph};
use tracing::debug;

use crate::error::AgentError;

/// Cap on path search depth; planner-provided depths are clamped to this.
const MAX_DEPTH: usize = 10;

pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connects to the graph database. Encryption is selected by URI scheme;
    /// `encrypted = true` upgrades a plain `neo4j://` URI to `neo4j+s://`.
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        encrypted: bool,
    ) -> Result<Self, AgentError> {
        let uri = if encrypted && uri.starts_with("neo4j://") {
            uri.replacen("neo4j://", "neo4j+s://", 1)
        } else {
            uri.to_string()
        };
        let graph = Graph::new(&uri, user, password)
            .await
            .map_err(|e| AgentError::Tool(format!("graph connect failed: {}", e)))?;
        Ok(Self { graph })
    }

    /// Shortest path between two sites by name; returns the ordered hop id list
    /// per path found (zero or one for shortestPath).
    pub async fn shortest_path(
        &self,
        src_site: &str,
        dst_site: &str,
        depth: usize,
    ) -> Result<Vec<Vec<String>>, AgentError> {
        let depth = depth.clamp(1, MAX_DEPTH);
        let cypher = format!(
            "MATCH (s:Site {{name: $src_site}}), (d:Site {{name: $dst_site}}) \
             MATCH p = shortestPath((s)-[:LINK*..{}]->(d)) \
             RETURN [n IN nodes(p) | n.id] AS hops",
            depth
        );
        self.run_hops_query(&cypher, src_site, dst_site).await
    }

    /// All shortest paths between two sites (the k-shortest variant the planner
    /// asks for on `query_type = "adjacency"`).
    pub async fn all_shortest_paths(
        &self,
        src_site: &str,
        dst_site: &str,
        depth: usize,
    ) -> Result<Vec<Vec<String>>, AgentError> {
        let depth = depth.clamp(1, MAX_DEPTH);
        let cypher = format!(
            "MATCH (s:Site {{name: $src_site}}), (d:Site {{name: $dst_site}}) \
             MATCH p = allShortestPaths((s)-[:LINK*..{}]->(d)) \
             RETURN [n IN nodes(p) | n.id] AS hops",
            depth
        );
        self.run_hops_query(&cypher, src_site, dst_site).await
    }

    async fn run_hops_query(
        &self,
        cypher: &str,
        src_site: &str,
        dst_site: &str,
    ) -> Result<Vec<Vec<String>>, AgentError> {
        debug!(src = src_site, dst = dst_site, "graph path query");
        let mut result = self
            .graph
            .execute(
                query(cypher)
                    .param("src_site", src_site)
                    .param("dst_site", dst_site),
            )
            .await
            .map_err(|e| AgentError::Tool(format!("graph query failed: {}", e)))?;

        let mut paths = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| AgentError::Tool(format!("graph row fetch failed: {}", e)))?
        {
            let hops: Vec<String> = row.get("hops").unwrap_or_default();
            if !hops.is_empty() {
                paths.push(hops);
            }
        }
        Ok(paths)
    }

    /// Readiness probe: a trivial round-trip.
    pub async fn ping(&self) -> bool {
        self.graph.run(query("RETURN 1")).await.is_ok()
    }
}
