//! pgvector client: comment and chat embedding search plus idempotent upserts.
//!
//! Two tables: `comment_embeddings(comment_id PK, embedding vector, metadata
//! jsonb)` and `chat_embeddings((session_id, message_id) PK, embedding vector,
//! metadata jsonb)`. Embeddings are passed as `'[...]'::vector` literals to
//! sidestep driver array-type mapping.

use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::error::AgentError;

/// One similarity hit from either embedding table.
#[derive(Clone, Debug)]
pub struct EmbeddingHit {
    pub id: String,
    pub distance: f64,
    pub metadata: serde_json::Value,
}

pub struct VectorClient {
    pool: PgPool,
}

fn vector_literal(embedding: &[f32]) -> String {
    let joined = embedding
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", joined)
}

impl VectorClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Top-`limit` comments by vector distance (ascending).
    pub async fn search_comment_embeddings(
        &self,
        embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<EmbeddingHit>, AgentError> {
        let rows = sqlx::query(
            "SELECT comment_id, metadata, \
                    embedding <-> ($1)::vector AS distance \
             FROM comment_embeddings \
             ORDER BY distance ASC \
             LIMIT $2",
        )
        .bind(vector_literal(embedding))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Tool(format!("comment vector search failed: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| EmbeddingHit {
                id: row.try_get::<String, _>("comment_id").unwrap_or_default(),
                distance: row.try_get::<f64, _>("distance").unwrap_or(0.0),
                metadata: row
                    .try_get::<serde_json::Value, _>("metadata")
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    /// Idempotent upsert of one comment embedding.
    pub async fn upsert_comment_embedding(
        &self,
        comment_id: &str,
        embedding: &[f32],
        metadata: &serde_json::Value,
    ) -> Result<(), AgentError> {
        sqlx::query(
            "INSERT INTO comment_embeddings (comment_id, embedding, metadata) \
             VALUES ($1, ($2)::vector, $3) \
             ON CONFLICT (comment_id) \
             DO UPDATE SET embedding = EXCLUDED.embedding, metadata = EXCLUDED.metadata",
        )
        .bind(comment_id)
        .bind(vector_literal(embedding))
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Tool(format!("comment embedding upsert failed: {}", e)))?;
        Ok(())
    }

    /// Top-`limit` chat snippets by vector distance, optionally scoped to one session.
    pub async fn search_chat_embeddings(
        &self,
        session_id: Option<&str>,
        embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<EmbeddingHit>, AgentError> {
        let rows = match session_id {
            Some(session_id) => {
                sqlx::query(
                    "SELECT session_id, message_id, metadata, \
                            embedding <-> ($1)::vector AS distance \
                     FROM chat_embeddings \
                     WHERE session_id = $3 \
                     ORDER BY distance ASC \
                     LIMIT $2",
                )
                .bind(vector_literal(embedding))
                .bind(limit)
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT session_id, message_id, metadata, \
                            embedding <-> ($1)::vector AS distance \
                     FROM chat_embeddings \
                     ORDER BY distance ASC \
                     LIMIT $2",
                )
                .bind(vector_literal(embedding))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AgentError::Tool(format!("chat vector search failed: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| {
                let session: String = row.try_get("session_id").unwrap_or_default();
                let message: i64 = row.try_get("message_id").unwrap_or_default();
                EmbeddingHit {
                    id: format!("{}:{}", session, message),
                    distance: row.try_get::<f64, _>("distance").unwrap_or(0.0),
                    metadata: row
                        .try_get::<serde_json::Value, _>("metadata")
                        .unwrap_or(serde_json::Value::Null),
                }
            })
            .collect())
    }

    /// Idempotent upsert of one chat message embedding.
    pub async fn upsert_chat_embedding(
        &self,
        session_id: &str,
        message_id: i64,
        embedding: &[f32],
        metadata: &serde_json::Value,
    ) -> Result<(), AgentError> {
        sqlx::query(
            "INSERT INTO chat_embeddings (session_id, message_id, embedding, metadata) \
             VALUES ($1, $2, ($3)::vector, $4) \
             ON CONFLICT (session_id, message_id) \
             DO UPDATE SET embedding = EXCLUDED.embedding, metadata = EXCLUDED.metadata",
        )
        .bind(session_id)
        .bind(message_id)
        .bind(vector_literal(embedding))
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Tool(format!("chat embedding upsert failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: the vector literal matches pgvector's input format.
    #[test]
    fn vector_literal_format() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.0]), "[0.5,-1,2]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
