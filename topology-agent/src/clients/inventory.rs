//! Inventory database client (Postgres, read-only).
//!
//! Queries `inventory_circuits` and `inventory_sites`. Site endpoints are
//! stored as site ids; callers pass site names, so the circuit lookup goes
//! through name subselects.

use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::debug;

use crate::error::AgentError;

pub struct InventoryClient {
    pool: PgPool,
}

fn circuit_row_to_json(row: &sqlx::postgres::PgRow) -> serde_json::Value {
    serde_json::json!({
        "circuit_id": row.try_get::<String, _>("id").unwrap_or_default(),
        "src_site": row.try_get::<String, _>("src_site").unwrap_or_default(),
        "dst_site": row.try_get::<String, _>("dst_site").unwrap_or_default(),
        "layer": row.try_get::<String, _>("layer").unwrap_or_default(),
        "status": row.try_get::<String, _>("status").unwrap_or_default(),
        "metadata": row
            .try_get::<serde_json::Value, _>("metadata")
            .unwrap_or(serde_json::Value::Null),
    })
}

impl InventoryClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Circuits between two sites (by name), optionally filtered by layer.
    pub async fn circuits_by_sites(
        &self,
        src_site: &str,
        dst_site: &str,
        layer: Option<&str>,
        limit: i64,
    ) -> Result<Vec<serde_json::Value>, AgentError> {
        let layer_clause = if layer.is_some() {
            "AND layer = $3"
        } else {
            ""
        };
        let sql = format!(
            "SELECT id, src_site, dst_site, layer, status, metadata \
             FROM inventory_circuits \
             WHERE src_site IN (SELECT id FROM inventory_sites WHERE name = $1) \
               AND dst_site IN (SELECT id FROM inventory_sites WHERE name = $2) \
               {} \
             LIMIT {}",
            layer_clause, limit
        );
        debug!(src = src_site, dst = dst_site, ?layer, "inventory circuits query");

        let mut query = sqlx::query(&sql).bind(src_site).bind(dst_site);
        if let Some(layer) = layer {
            query = query.bind(layer);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::Tool(format!("inventory query failed: {}", e)))?;

        Ok(rows.iter().map(circuit_row_to_json).collect())
    }

    /// Circuits by id.
    pub async fn circuits_by_ids(
        &self,
        circuit_ids: &[String],
    ) -> Result<Vec<serde_json::Value>, AgentError> {
        if circuit_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, src_site, dst_site, layer, status, metadata \
             FROM inventory_circuits WHERE id = ANY($1)",
        )
        .bind(circuit_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Tool(format!("inventory query failed: {}", e)))?;

        Ok(rows.iter().map(circuit_row_to_json).collect())
    }

    /// Site records by id or name.
    pub async fn sites_by_ids(
        &self,
        site_ids: &[String],
    ) -> Result<Vec<serde_json::Value>, AgentError> {
        if site_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, name, region, metadata FROM inventory_sites \
             WHERE id = ANY($1) OR name = ANY($1)",
        )
        .bind(site_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Tool(format!("inventory query failed: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| {
                serde_json::json!({
                    "id": row.try_get::<String, _>("id").unwrap_or_default(),
                    "name": row.try_get::<String, _>("name").unwrap_or_default(),
                    "region": row.try_get::<String, _>("region").unwrap_or_default(),
                    "metadata": row
                        .try_get::<serde_json::Value, _>("metadata")
                        .unwrap_or(serde_json::Value::Null),
                })
            })
            .collect())
    }

    /// Readiness probe.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
