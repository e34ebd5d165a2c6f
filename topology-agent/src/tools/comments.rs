//! Comments search tool: three-stage reranking over the NOC comment store.
//!
//! 1. Embed the query text; fetch the top-50 candidates by vector distance
//!    from pgvector.
//! 2. BM25-score candidate texts against the tokenized query and fuse vector
//!    rank with BM25 rank by Reciprocal Rank Fusion; keep the top 15.
//! 3. Cross-encoder rerank the survivors against the query; return top-K.
//!
//! Every returned comment carries the original vector distance, the RRF score,
//! and the cross-encoder score so the UI can explain its ordering.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::clients::vector::VectorClient;
use crate::embedding::{CrossEncoder, Embedder};
use crate::error::AgentError;
use crate::state::{RequestState, ToolEnvelope, ToolKind};
use crate::tools::{string_list, string_param, usize_param, ResolvedParams, Tool};

/// Stage-1 candidate pool size.
const BROAD_K: i64 = 50;
/// Stage-2 survivors handed to the cross-encoder.
const RRF_K: usize = 15;
/// RRF dampening constant.
const RRF_C: f64 = 60.0;

/// BM25-Okapi parameters.
const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

pub struct CommentsSearchTool {
    vector: Option<Arc<VectorClient>>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn CrossEncoder>,
    default_top_k: usize,
}

impl CommentsSearchTool {
    pub fn new(
        vector: Option<Arc<VectorClient>>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn CrossEncoder>,
        default_top_k: usize,
    ) -> Self {
        Self {
            vector,
            embedder,
            reranker,
            default_top_k,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// BM25-Okapi scores for each document against the query tokens.
pub(crate) fn bm25_scores(corpus: &[Vec<String>], query: &[String]) -> Vec<f64> {
    let n = corpus.len();
    if n == 0 {
        return Vec::new();
    }
    let avgdl = corpus.iter().map(Vec::len).sum::<usize>() as f64 / n as f64;

    // Document frequency per unique query term.
    let mut unique_terms: Vec<&String> = Vec::new();
    for term in query {
        if !unique_terms.contains(&term) {
            unique_terms.push(term);
        }
    }
    let dfs: Vec<f64> = unique_terms
        .iter()
        .map(|term| corpus.iter().filter(|doc| doc.contains(term)).count() as f64)
        .collect();

    corpus
        .iter()
        .map(|doc| {
            let dl = doc.len() as f64;
            unique_terms
                .iter()
                .zip(&dfs)
                .map(|(term, df)| {
                    let tf = doc.iter().filter(|t| t == term).count() as f64;
                    if tf == 0.0 {
                        return 0.0;
                    }
                    let idf = ((n as f64 - df + 0.5) / (df + 0.5) + 1.0).ln();
                    idf * (tf * (BM25_K1 + 1.0))
                        / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl.max(1e-9)))
                })
                .sum()
        })
        .collect()
}

struct Candidate {
    comment_id: String,
    text: String,
    metadata: serde_json::Value,
    vector_rank: usize,
    vector_distance: f64,
    rrf_score: f64,
    cross_encoder_score: f64,
}

#[async_trait]
impl Tool for CommentsSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CommentsSearch
    }

    async fn call(
        &self,
        params: &ResolvedParams,
        state: &RequestState,
    ) -> Result<ToolEnvelope, AgentError> {
        let site_names = string_list(params, "site_names");
        let device_ids = string_list(params, "device_ids");
        let circuit_ids = string_list(params, "circuit_ids");
        let top_k = usize_param(params, "top_k").unwrap_or(self.default_top_k);

        let search_text = string_param(params, "query_text")
            .unwrap_or_else(|| state.user_input.trim().to_string());
        if search_text.is_empty() {
            return Ok(ToolEnvelope::ok(
                serde_json::json!({ "comments": [] }),
                serde_json::json!({ "source": "comment_tool", "reason": "empty search_text" }),
            ));
        }

        let Some(vector) = &self.vector else {
            return Ok(ToolEnvelope::ok(
                serde_json::json!({ "comments": [] }),
                serde_json::json!({
                    "source": "comment_tool_stub",
                    "reason": "vector store not configured",
                }),
            ));
        };

        // Stage 1: vector candidate generation.
        let embedding = self.embedder.embed(&search_text).await?;
        let rows = vector.search_comment_embeddings(&embedding, BROAD_K).await?;
        if rows.is_empty() {
            return Ok(ToolEnvelope::ok(
                serde_json::json!({ "comments": [] }),
                serde_json::json!({
                    "source": "comment_rag_pgvector",
                    "query_text": search_text,
                    "num_results": 0,
                }),
            ));
        }

        let mut candidates: Vec<Candidate> = rows
            .into_iter()
            .enumerate()
            .map(|(i, hit)| Candidate {
                text: hit
                    .metadata
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                comment_id: hit.id,
                metadata: hit.metadata,
                vector_rank: i + 1,
                vector_distance: hit.distance,
                rrf_score: 0.0,
                cross_encoder_score: 0.0,
            })
            .collect();
        let num_candidates_vector = candidates.len();

        // Stage 2: BM25 + reciprocal rank fusion.
        let corpus: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(&c.text)).collect();
        let query_tokens = tokenize(&search_text);
        let scores = bm25_scores(&corpus, &query_tokens);

        let mut by_bm25: Vec<usize> = (0..candidates.len()).collect();
        by_bm25.sort_by(|a, b| scores[*b].partial_cmp(&scores[*a]).unwrap_or(std::cmp::Ordering::Equal));
        let mut bm25_rank = vec![0usize; candidates.len()];
        for (rank, idx) in by_bm25.iter().enumerate() {
            bm25_rank[*idx] = rank + 1;
        }

        for (i, candidate) in candidates.iter_mut().enumerate() {
            candidate.rrf_score = 1.0 / (RRF_C + candidate.vector_rank as f64)
                + 1.0 / (RRF_C + bm25_rank[i] as f64);
        }
        candidates.sort_by(|a, b| {
            b.rrf_score
                .partial_cmp(&a.rrf_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(RRF_K);
        let num_candidates_rrf = candidates.len();

        // Stage 3: cross-encoder rerank; on rerank failure keep the RRF order.
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let mut rerank_error = None;
        match self.reranker.score(&search_text, &texts).await {
            Ok(ce_scores) => {
                for (candidate, score) in candidates.iter_mut().zip(ce_scores) {
                    candidate.cross_encoder_score = f64::from(score);
                }
                candidates.sort_by(|a, b| {
                    b.cross_encoder_score
                        .partial_cmp(&a.cross_encoder_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            Err(e) => {
                warn!(error = %e, "cross-encoder rerank failed; keeping RRF order");
                rerank_error = Some(e.to_string());
            }
        }
        candidates.truncate(top_k);

        let comments: Vec<serde_json::Value> = candidates
            .iter()
            .map(|c| {
                serde_json::json!({
                    "comment_id": c.comment_id,
                    "vector_distance": c.vector_distance,
                    "rrf_score": c.rrf_score,
                    "cross_encoder_score": c.cross_encoder_score,
                    "metadata": c.metadata,
                })
            })
            .collect();

        Ok(ToolEnvelope::ok(
            serde_json::json!({ "comments": comments }),
            serde_json::json!({
                "source": "comment_rag_pgvector_reranked",
                "query_text": search_text,
                "top_k": top_k,
                "num_candidates_vector": num_candidates_vector,
                "num_candidates_rrf": num_candidates_rrf,
                "num_results": comments.len(),
                "rerank_error": rerank_error,
                "elements_checked": {
                    "sites": site_names.len(),
                    "devices": device_ids.len(),
                    "circuits": circuit_ids.len(),
                },
            }),
        ))
    }
}
