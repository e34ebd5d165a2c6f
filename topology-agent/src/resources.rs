//! Process-wide shared resources.
//!
//! One `Resources` is built at startup and shared by every request: connection
//! pools, the usage store, the breaker registry, the gateway, and the compiled
//! workflow. Optional backends that fail to initialize are logged and left
//! `None`; the tools degrade to stub envelopes rather than failing requests.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use env_config::{BackendKind, Settings};

use crate::clients::graph::GraphClient;
use crate::clients::hierarchy::HierarchyClient;
use crate::clients::inventory::InventoryClient;
use crate::clients::vector::VectorClient;
use crate::embedding::{
    CrossEncoder, Embedder, HashEmbedder, HttpReranker, LexicalOverlapScorer, OpenAiEmbedder,
};
use crate::error::AgentError;
use crate::executor::breaker::CircuitBreaker;
use crate::gateway::storage::FileUsageStore;
use crate::gateway::Gateway;
use crate::graph::CompiledStateGraph;
use crate::state::RequestState;
use crate::tools::{
    comments::CommentsSearchTool, hierarchy::HierarchyTool, inventory::InventoryTool,
    memory::MemorySearchTool, outage::OutageTool, topology::TopologyTool, ToolRegistry,
};
use crate::workflow::build_workflow;

use async_openai::config::OpenAIConfig;

pub struct Resources {
    pub settings: Arc<Settings>,
    pub gateway: Arc<Gateway>,
    pub breaker: Arc<CircuitBreaker>,
    pub graph_client: Option<Arc<GraphClient>>,
    pub inventory: Option<Arc<InventoryClient>>,
    pub vector: Option<Arc<VectorClient>>,
    pub redis: Option<redis::aio::ConnectionManager>,
    workflow: CompiledStateGraph<RequestState>,
}

fn build_embedder(settings: &Settings) -> Arc<dyn Embedder> {
    let backend = settings.embedding_backend.unwrap_or(settings.llm_backend);
    match backend {
        BackendKind::OpenAi => Arc::new(OpenAiEmbedder::new(settings.embedding_model.clone())),
        BackendKind::Vllm => Arc::new(OpenAiEmbedder::with_config(
            OpenAIConfig::new()
                .with_api_base(settings.vllm_base_url.clone())
                .with_api_key("not-needed"),
            settings.embedding_model.clone(),
        )),
        BackendKind::Ollama => Arc::new(OpenAiEmbedder::with_config(
            OpenAIConfig::new()
                .with_api_base(settings.ollama_base_url.clone())
                .with_api_key("ollama"),
            settings.embedding_model.clone(),
        )),
        other => {
            if !matches!(other, BackendKind::Mock) {
                warn!(
                    backend = other.as_str(),
                    "embedding backend not available in this build; using offline hash embedder"
                );
            }
            Arc::new(HashEmbedder::default())
        }
    }
}

fn build_reranker(settings: &Settings) -> Arc<dyn CrossEncoder> {
    match &settings.rerank_url {
        Some(url) => Arc::new(HttpReranker::new(url.clone())),
        None => Arc::new(LexicalOverlapScorer),
    }
}

impl Resources {
    /// Builds everything from settings, with the file-backed usage store.
    pub async fn init(settings: Arc<Settings>) -> Result<Arc<Self>, AgentError> {
        let store = Arc::new(FileUsageStore::new(
            settings.usage_checkpoint_file.clone(),
            settings.usage_call_log_file.clone(),
        ));
        let gateway = Arc::new(Gateway::new(settings.clone(), store));
        Self::init_with_gateway(settings, gateway).await
    }

    /// Builds resources around an existing gateway (tests inject scripted mocks).
    pub async fn init_with_gateway(
        settings: Arc<Settings>,
        gateway: Arc<Gateway>,
    ) -> Result<Arc<Self>, AgentError> {
        // Inventory + vector store share one lazy pool; nothing connects until
        // the first query.
        let pool = match &settings.database_url {
            Some(url) => match PgPoolOptions::new().max_connections(10).connect_lazy(url) {
                Ok(pool) => {
                    info!("database pool initialized");
                    Some(pool)
                }
                Err(e) => {
                    warn!(error = %e, "database pool init failed; inventory and comments degrade to stubs");
                    None
                }
            },
            None => {
                info!("database not configured");
                None
            }
        };
        let inventory = pool.clone().map(|p| Arc::new(InventoryClient::new(p)));
        let vector = pool.map(|p| Arc::new(VectorClient::new(p)));

        let graph_client = match (&settings.graph_db_uri, &settings.graph_db_user) {
            (Some(uri), Some(user)) => {
                let password = settings.graph_db_password.clone().unwrap_or_default();
                match GraphClient::connect(uri, user, &password, settings.graph_db_encrypted).await
                {
                    Ok(client) => {
                        info!(uri = %uri, "graph client initialized");
                        Some(Arc::new(client))
                    }
                    Err(e) => {
                        warn!(uri = %uri, error = %e, "graph client init failed; topology degrades to stubs");
                        None
                    }
                }
            }
            _ => {
                info!("graph client not configured");
                None
            }
        };

        let redis = match &settings.redis_url {
            Some(url) => match redis::Client::open(url.as_str()) {
                Ok(client) => match redis::aio::ConnectionManager::new(client).await {
                    Ok(manager) => {
                        info!("redis initialized");
                        Some(manager)
                    }
                    Err(e) => {
                        warn!(error = %e, "redis connection failed; cache disabled");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "redis url invalid; cache disabled");
                    None
                }
            },
            None => None,
        };

        if settings.tracing_endpoint.is_some() {
            info!("tracing export endpoint configured");
        }

        let hierarchy = settings.hierarchy_base_url.as_ref().map(|base| {
            Arc::new(HierarchyClient::new(
                base.clone(),
                redis.clone(),
                settings.hierarchy_cache_ttl_secs,
            ))
        });

        let embedder = build_embedder(&settings);
        let reranker = build_reranker(&settings);

        let registry = Arc::new(
            ToolRegistry::new()
                .register(Arc::new(TopologyTool::new(graph_client.clone())))
                .register(Arc::new(InventoryTool::new(inventory.clone())))
                .register(Arc::new(CommentsSearchTool::new(
                    vector.clone(),
                    embedder.clone(),
                    reranker,
                    settings.comment_rag_top_k,
                )))
                .register(Arc::new(OutageTool))
                .register(Arc::new(HierarchyTool::new(hierarchy)))
                .register(Arc::new(MemorySearchTool::new(vector.clone(), embedder))),
        );

        let breaker = Arc::new(CircuitBreaker::new(
            settings.breaker_failure_threshold,
            Duration::from_secs(settings.breaker_recovery_timeout_secs),
        ));

        let workflow = build_workflow(
            gateway.clone(),
            settings.clone(),
            registry,
            breaker.clone(),
        )
        .map_err(|e| AgentError::Graph(format!("workflow compile failed: {}", e)))?;

        Ok(Arc::new(Self {
            settings,
            gateway,
            breaker,
            graph_client,
            inventory,
            vector,
            redis,
            workflow,
        }))
    }

    /// Runs one request through the compiled workflow.
    pub async fn run_query(&self, state: RequestState) -> Result<RequestState, AgentError> {
        self.workflow.invoke(state).await
    }

    /// Per-dependency readiness probe for `GET /ready`.
    pub async fn readiness(&self) -> serde_json::Value {
        let mut overall = "ok";

        let db = match &self.inventory {
            None => "disabled".to_string(),
            Some(client) => {
                if client.ping().await {
                    "ok".to_string()
                } else {
                    overall = "degraded";
                    "error".to_string()
                }
            }
        };

        let graph = match &self.graph_client {
            None => "disabled".to_string(),
            Some(client) => {
                if client.ping().await {
                    "ok".to_string()
                } else {
                    overall = "degraded";
                    "error".to_string()
                }
            }
        };

        let redis = match &self.redis {
            None => "disabled".to_string(),
            Some(manager) => {
                let mut conn = manager.clone();
                let pong: redis::RedisResult<String> =
                    redis::cmd("PING").query_async(&mut conn).await;
                match pong {
                    Ok(_) => "ok".to_string(),
                    Err(_) => {
                        overall = "degraded";
                        "error".to_string()
                    }
                }
            }
        };

        serde_json::json!({
            "status": overall,
            "db": db,
            "graph": graph,
            "redis": redis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: with nothing configured, init succeeds, all optional clients
    /// are absent, and readiness reports them disabled but overall ok.
    #[tokio::test]
    async fn init_without_backends() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(Settings {
            llm_backend: BackendKind::Mock,
            fallback_backend: BackendKind::Mock,
            usage_checkpoint_file: dir
                .path()
                .join("usage.json")
                .to_string_lossy()
                .into_owned(),
            usage_call_log_file: dir
                .path()
                .join("calls.jsonl")
                .to_string_lossy()
                .into_owned(),
            ..Settings::default()
        });
        let resources = Resources::init(settings).await.unwrap();
        assert!(resources.graph_client.is_none());
        assert!(resources.inventory.is_none());
        assert!(resources.redis.is_none());

        let ready = resources.readiness().await;
        assert_eq!(ready["status"], "ok");
        assert_eq!(ready["db"], "disabled");
        assert_eq!(ready["graph"], "disabled");
        assert_eq!(ready["redis"], "disabled");
    }
}
