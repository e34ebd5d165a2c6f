//! Embedding and rerank model seams for the comment search pipeline.
//!
//! [`Embedder`] turns query text into vectors for the pgvector candidate fetch;
//! [`CrossEncoder`] scores (query, document) pairs for the final rerank stage.
//! Both have an offline implementation so the pipeline stays functional (and
//! deterministic in tests) without any model endpoint configured.

use async_openai::{
    config::OpenAIConfig,
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AgentError;

/// Text → vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError>;
}

/// OpenAI-compatible embeddings client (remote OpenAI, vLLM, Ollama via base URL).
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// API key from `OPENAI_API_KEY` env.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
        }
    }

    /// Custom config (API key, base URL) for self-hosted embedding servers.
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::String(text.to_string()),
            ..Default::default()
        };
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| AgentError::Gateway(format!("embedding API error: {}", e)))?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AgentError::Gateway("embedding API returned no data".to_string()))
    }
}

/// Deterministic offline embedder: token hashes folded into a fixed-dimension
/// bag-of-words vector. No semantic quality, but stable ordering for stub runs.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let mut vector = vec![0f32; self.dimensions];
        for token in text.to_lowercase().split_whitespace() {
            let slot = (fnv1a(token) as usize) % self.dimensions;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// (query, documents) → relevance scores, higher is better.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, AgentError>;
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    score: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RerankResponse {
    Scores { scores: Vec<f32> },
    Items(Vec<RerankItem>),
}

/// HTTP reranker: POSTs `{query, texts}` to a rerank endpoint (TEI / vLLM
/// style) and reads back scores either as `{scores: [...]}` or as
/// `[{index, score}]`.
pub struct HttpReranker {
    url: String,
    http: reqwest::Client,
}

impl HttpReranker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CrossEncoder for HttpReranker {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, AgentError> {
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "query": query, "texts": texts }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AgentError::Http(format!("rerank API: {}", e)))?;

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Http(format!("rerank response parse: {}", e)))?;

        let scores = match parsed {
            RerankResponse::Scores { scores } => scores,
            RerankResponse::Items(items) => {
                let mut scores = vec![0f32; texts.len()];
                for item in items {
                    if item.index < scores.len() {
                        scores[item.index] = item.score;
                    }
                }
                scores
            }
        };

        if scores.len() != texts.len() {
            return Err(AgentError::Http(format!(
                "rerank returned {} scores for {} texts",
                scores.len(),
                texts.len()
            )));
        }
        Ok(scores)
    }
}

/// Offline rerank fallback: token-overlap (Jaccard) between query and document.
/// Deterministic, so stub-mode responses and tests are stable.
pub struct LexicalOverlapScorer;

#[async_trait]
impl CrossEncoder for LexicalOverlapScorer {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, AgentError> {
        let query_tokens: std::collections::HashSet<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(texts
            .iter()
            .map(|text| {
                let doc_tokens: std::collections::HashSet<String> = text
                    .to_lowercase()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                if query_tokens.is_empty() || doc_tokens.is_empty() {
                    return 0.0;
                }
                let intersection = query_tokens.intersection(&doc_tokens).count() as f32;
                let union = query_tokens.union(&doc_tokens).count() as f32;
                intersection / union
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: the hash embedder is deterministic, normalized, and
    /// insensitive to case.
    #[tokio::test]
    async fn hash_embedder_is_stable() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("BGP peering down in Dallas").await.unwrap();
        let b = embedder.embed("bgp peering down in dallas").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    /// **Scenario**: lexical overlap ranks the on-topic document above the
    /// off-topic one.
    #[tokio::test]
    async fn lexical_scorer_orders_by_overlap() {
        let scorer = LexicalOverlapScorer;
        let scores = scorer
            .score(
                "dallas fiber cut outage",
                &[
                    "fiber cut reported near dallas".to_string(),
                    "seattle maintenance window".to_string(),
                ],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
    }
}
