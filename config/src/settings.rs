//! Typed settings parsed from `TOPOLOGY_AGENT_*` environment variables.
//!
//! Call [`crate::load_env`] first so `.env`/XDG values are visible, then
//! [`Settings::from_env`]. Every field has a default except the ones a deployment
//! cannot guess (database and graph endpoints stay `None` and the tools degrade
//! to stub envelopes when they are absent).

use std::str::FromStr;

use thiserror::Error;

/// Env var prefix for all settings, e.g. `TOPOLOGY_AGENT_DATABASE_URL`.
pub const ENV_PREFIX: &str = "TOPOLOGY_AGENT_";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Deployment environment; drives the guardrail trailer and log verbosity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeployEnv {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl DeployEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "dev",
            DeployEnv::Staging => "staging",
            DeployEnv::Prod => "prod",
        }
    }
}

impl FromStr for DeployEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            _ => Err(format!("unknown env: {} (use dev, staging, or prod)", s)),
        }
    }
}

/// LLM / embedding backend families the gateway knows how to build.
///
/// `OpenAi`, `Vllm`, and `Ollama` all speak the OpenAI-compatible chat API and
/// differ only in base URL and model table. `Bedrock` and `Vertex` are
/// recognized names that fail at handle creation when this build has no cloud
/// SDK wired in. `Mock` is the in-process test backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    OpenAi,
    Bedrock,
    Vertex,
    Vllm,
    Ollama,
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Bedrock => "bedrock",
            BackendKind::Vertex => "vertex",
            BackendKind::Vllm => "vllm",
            BackendKind::Ollama => "ollama",
            BackendKind::Mock => "mock",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "bedrock" => Ok(Self::Bedrock),
            "vertex" => Ok(Self::Vertex),
            "vllm" => Ok(Self::Vllm),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            _ => Err(format!(
                "unknown backend: {} (use openai, bedrock, vertex, vllm, ollama, or mock)",
                s
            )),
        }
    }
}

/// All service settings. One instance is built at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct Settings {
    // General
    pub env: DeployEnv,
    pub app_name: String,
    pub log_level: String,

    // HTTP
    pub host: String,
    pub port: u16,
    pub api_prefix: String,

    // Inventory + vector database (Postgres with pgvector)
    pub database_url: Option<String>,

    // Graph DB (topology)
    pub graph_db_uri: Option<String>,
    pub graph_db_user: Option<String>,
    pub graph_db_password: Option<String>,
    pub graph_db_encrypted: bool,

    // Cache
    pub redis_url: Option<String>,

    // LLM backends
    pub llm_backend: BackendKind,
    pub fallback_backend: BackendKind,
    pub embedding_backend: Option<BackendKind>,
    pub vllm_base_url: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub embedding_model: String,

    // Comment RAG
    pub comment_rag_top_k: usize,
    pub rerank_url: Option<String>,

    // Hierarchy API
    pub hierarchy_base_url: Option<String>,
    pub hierarchy_cache_ttl_secs: u64,

    // Per-tool resilience knobs
    pub tool_retry_max_attempts: u32,
    pub tool_retry_min_wait_ms: u64,
    pub tool_retry_max_wait_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub tool_concurrency: usize,
    pub request_timeout_secs: u64,

    // Budgets and usage accounting
    pub global_llm_budget: f64,
    pub user_llm_budget: f64,
    pub usage_checkpoint_file: String,
    pub usage_call_log_file: String,

    // Refinement / responder
    pub max_plan_retries: u32,
    pub validator_judge_enabled: bool,
    pub response_top_n: usize,

    // Optional tracing export
    pub tracing_endpoint: Option<String>,
    pub tracing_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: DeployEnv::Dev,
            app_name: "Topology Agent Service".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "/api".to_string(),
            database_url: None,
            graph_db_uri: None,
            graph_db_user: None,
            graph_db_password: None,
            graph_db_encrypted: false,
            redis_url: None,
            llm_backend: BackendKind::OpenAi,
            fallback_backend: BackendKind::Ollama,
            embedding_backend: None,
            vllm_base_url: "http://localhost:8000/v1".to_string(),
            ollama_base_url: "http://localhost:11434/v1".to_string(),
            ollama_model: "mistral".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            comment_rag_top_k: 5,
            rerank_url: None,
            hierarchy_base_url: None,
            hierarchy_cache_ttl_secs: 300,
            tool_retry_max_attempts: 3,
            tool_retry_min_wait_ms: 200,
            tool_retry_max_wait_ms: 5_000,
            breaker_failure_threshold: 5,
            breaker_recovery_timeout_secs: 60,
            tool_timeout_secs: 30,
            tool_concurrency: 4,
            request_timeout_secs: 120,
            global_llm_budget: 100.0,
            user_llm_budget: 10.0,
            usage_checkpoint_file: ".llm_usage.json".to_string(),
            usage_call_log_file: ".llm_call_logs.jsonl".to_string(),
            max_plan_retries: 1,
            validator_judge_enabled: false,
            response_top_n: 10,
            tracing_endpoint: None,
            tracing_api_key: None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| SettingsError::Invalid {
            key: format!("{}{}", ENV_PREFIX, key),
            value: raw,
            reason: e.to_string(),
        }),
    }
}

impl Settings {
    /// Builds settings from the process environment. Unset keys keep defaults;
    /// malformed values are errors rather than silent fallbacks.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut s = Settings::default();

        if let Some(env) = parse_var::<DeployEnv>("ENV")? {
            s.env = env;
        }
        if let Some(v) = var("APP_NAME") {
            s.app_name = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            s.log_level = v;
        }
        if let Some(v) = var("HOST") {
            s.host = v;
        }
        if let Some(v) = parse_var::<u16>("PORT")? {
            s.port = v;
        }
        if let Some(v) = var("API_PREFIX") {
            s.api_prefix = v;
        }

        s.database_url = var("DATABASE_URL");
        s.graph_db_uri = var("GRAPH_DB_URI");
        s.graph_db_user = var("GRAPH_DB_USER");
        s.graph_db_password = var("GRAPH_DB_PASSWORD");
        if let Some(v) = parse_var::<bool>("GRAPH_DB_ENCRYPTED")? {
            s.graph_db_encrypted = v;
        }
        s.redis_url = var("REDIS_URL");

        if let Some(v) = parse_var::<BackendKind>("LLM_BACKEND")? {
            s.llm_backend = v;
        }
        if let Some(v) = parse_var::<BackendKind>("FALLBACK_BACKEND")? {
            s.fallback_backend = v;
        }
        s.embedding_backend = parse_var::<BackendKind>("EMBEDDING_BACKEND")?;
        if let Some(v) = var("VLLM_BASE_URL") {
            s.vllm_base_url = v;
        }
        if let Some(v) = var("OLLAMA_BASE_URL") {
            s.ollama_base_url = v;
        }
        if let Some(v) = var("OLLAMA_MODEL") {
            s.ollama_model = v;
        }
        if let Some(v) = var("EMBEDDING_MODEL") {
            s.embedding_model = v;
        }

        if let Some(v) = parse_var::<usize>("COMMENT_RAG_TOP_K")? {
            s.comment_rag_top_k = v;
        }
        s.rerank_url = var("RERANK_URL");
        s.hierarchy_base_url = var("HIERARCHY_BASE_URL");
        if let Some(v) = parse_var::<u64>("HIERARCHY_CACHE_TTL_SECS")? {
            s.hierarchy_cache_ttl_secs = v;
        }

        if let Some(v) = parse_var::<u32>("TOOL_RETRY_MAX_ATTEMPTS")? {
            s.tool_retry_max_attempts = v;
        }
        if let Some(v) = parse_var::<u64>("TOOL_RETRY_MIN_WAIT_MS")? {
            s.tool_retry_min_wait_ms = v;
        }
        if let Some(v) = parse_var::<u64>("TOOL_RETRY_MAX_WAIT_MS")? {
            s.tool_retry_max_wait_ms = v;
        }
        if let Some(v) = parse_var::<u32>("BREAKER_FAILURE_THRESHOLD")? {
            s.breaker_failure_threshold = v;
        }
        if let Some(v) = parse_var::<u64>("BREAKER_RECOVERY_TIMEOUT_SECS")? {
            s.breaker_recovery_timeout_secs = v;
        }
        if let Some(v) = parse_var::<u64>("TOOL_TIMEOUT_SECS")? {
            s.tool_timeout_secs = v;
        }
        if let Some(v) = parse_var::<usize>("TOOL_CONCURRENCY")? {
            s.tool_concurrency = v;
        }
        if let Some(v) = parse_var::<u64>("REQUEST_TIMEOUT_SECS")? {
            s.request_timeout_secs = v;
        }

        if let Some(v) = parse_var::<f64>("GLOBAL_LLM_BUDGET")? {
            s.global_llm_budget = v;
        }
        if let Some(v) = parse_var::<f64>("USER_LLM_BUDGET")? {
            s.user_llm_budget = v;
        }
        if let Some(v) = var("USAGE_CHECKPOINT_FILE") {
            s.usage_checkpoint_file = v;
        }
        if let Some(v) = var("USAGE_CALL_LOG_FILE") {
            s.usage_call_log_file = v;
        }

        if let Some(v) = parse_var::<u32>("MAX_PLAN_RETRIES")? {
            s.max_plan_retries = v;
        }
        if let Some(v) = parse_var::<bool>("VALIDATOR_JUDGE_ENABLED")? {
            s.validator_judge_enabled = v;
        }
        if let Some(v) = parse_var::<usize>("RESPONSE_TOP_N")? {
            s.response_top_n = v;
        }

        s.tracing_endpoint = var("TRACING_ENDPOINT");
        s.tracing_api_key = var("TRACING_API_KEY");

        Ok(s)
    }
}
