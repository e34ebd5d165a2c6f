//! LLM gateway: one funnel in front of every model call.
//!
//! `Gateway::get_model` checks budgets (degrading to the fallback backend on
//! breach, never failing), picks the per-tier model for the chosen backend, and
//! returns a [`GatewayModel`] that wraps the raw backend in input guardrails,
//! usage accounting, and output guardrails. Unavailable backends fail here, at
//! handle creation, not mid-request.

pub mod backends;
pub mod budget;
pub mod guardrails;
pub mod storage;

use std::sync::Arc;

use tracing::{error, warn};

use env_config::{BackendKind, DeployEnv, Settings};

use crate::error::AgentError;
use crate::gateway::backends::{ChatCompletion, ChatModel, MockChat, OpenAiChat};
use crate::gateway::guardrails::{
    apply_input_guardrails, apply_output_guardrails, apply_safety_policies, GuardrailConfig,
};
use crate::gateway::storage::{CallLogEntry, UsageStore};
use crate::message::ChatMessage;

pub use backends::TokenUsage;
pub use guardrails::{RbacLevel, INJECTION_BLOCKED_SENTINEL, READ_ONLY_RESTRICTED_TOOLS};

use async_openai::config::OpenAIConfig;

/// Which stage is calling: planners get the stronger model variant, the
/// validator and responder get the cheaper one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
    Planner,
    Validator,
    Response,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Planner => "planner",
            ModelTier::Validator => "validator",
            ModelTier::Response => "response",
        }
    }
}

/// Attribution for usage accounting.
#[derive(Clone, Debug, Default)]
pub struct TrackingTags {
    pub user_id: String,
    pub session_id: Option<String>,
    pub agent_role: String,
}

impl TrackingTags {
    fn user(&self) -> &str {
        if self.user_id.is_empty() {
            "anonymous"
        } else {
            &self.user_id
        }
    }
}

/// Transparent gateway interface for fetching model handles.
pub struct Gateway {
    settings: Arc<Settings>,
    store: Arc<dyn UsageStore>,
    /// Backend substituted for `BackendKind::Mock`; tests inject scripted mocks.
    mock_backend: Option<Arc<dyn ChatModel>>,
}

impl Gateway {
    pub fn new(settings: Arc<Settings>, store: Arc<dyn UsageStore>) -> Self {
        Self {
            settings,
            store,
            mock_backend: None,
        }
    }

    /// Replaces the default mock backend, letting tests script model outputs.
    pub fn with_mock_backend(mut self, backend: Arc<dyn ChatModel>) -> Self {
        self.mock_backend = Some(backend);
        self
    }

    /// Builds a model handle for the tier, enforcing budgets first.
    ///
    /// A breached global or per-user budget silently substitutes the configured
    /// fallback backend (degradation, never an error). Unknown or unbuilt
    /// backends (Bedrock/Vertex in this build) raise here.
    pub async fn get_model(
        &self,
        tier: ModelTier,
        temperature: f32,
        tags: TrackingTags,
        guardrails: GuardrailConfig,
    ) -> Result<GatewayModel, AgentError> {
        let mut backend = self.settings.llm_backend;

        let global_spend = self.store.global_cost().await;
        let user_spend = self.store.user_cost(tags.user()).await;

        let limit_breached = if global_spend >= self.settings.global_llm_budget {
            warn!(
                spent = global_spend,
                limit = self.settings.global_llm_budget,
                "global LLM budget breached"
            );
            true
        } else if user_spend >= self.settings.user_llm_budget {
            warn!(
                user = tags.user(),
                spent = user_spend,
                limit = self.settings.user_llm_budget,
                "user LLM budget breached"
            );
            true
        } else {
            false
        };

        if limit_breached {
            warn!(
                from = backend.as_str(),
                to = self.settings.fallback_backend.as_str(),
                "degrading LLM backend"
            );
            backend = self.settings.fallback_backend;
        }

        let chat = self.create_backend(backend, tier, temperature)?;

        Ok(GatewayModel {
            chat,
            guardrails,
            env: self.settings.env,
            app_name: self.settings.app_name.clone(),
            tags,
            store: self.store.clone(),
        })
    }

    fn create_backend(
        &self,
        backend: BackendKind,
        tier: ModelTier,
        temperature: f32,
    ) -> Result<Arc<dyn ChatModel>, AgentError> {
        match backend {
            BackendKind::OpenAi => {
                let model = match tier {
                    ModelTier::Planner => "gpt-4o",
                    _ => "gpt-4o-mini",
                };
                Ok(Arc::new(
                    OpenAiChat::new(model).with_temperature(temperature),
                ))
            }
            BackendKind::Vllm => {
                let model = match tier {
                    ModelTier::Planner => "local-gpt-4o-equivalent",
                    _ => "local-judge-model",
                };
                let config = OpenAIConfig::new()
                    .with_api_base(self.settings.vllm_base_url.clone())
                    .with_api_key("not-needed");
                Ok(Arc::new(
                    OpenAiChat::with_config(config, model).with_temperature(temperature),
                ))
            }
            BackendKind::Ollama => {
                let config = OpenAIConfig::new()
                    .with_api_base(self.settings.ollama_base_url.clone())
                    .with_api_key("ollama");
                Ok(Arc::new(
                    OpenAiChat::with_config(config, self.settings.ollama_model.clone())
                        .with_temperature(temperature),
                ))
            }
            BackendKind::Mock => Ok(self
                .mock_backend
                .clone()
                .unwrap_or_else(|| Arc::new(MockChat::with_content("{}")))),
            BackendKind::Bedrock | BackendKind::Vertex => Err(AgentError::Gateway(format!(
                "backend {} is not available in this build; configure an \
                 OpenAI-compatible backend (openai, vllm, ollama) or mock",
                backend.as_str()
            ))),
        }
    }
}

/// A callable model handle: guardrails in, backend call, accounting, guardrails out.
pub struct GatewayModel {
    chat: Arc<dyn ChatModel>,
    guardrails: GuardrailConfig,
    env: DeployEnv,
    app_name: String,
    tags: TrackingTags,
    store: Arc<dyn UsageStore>,
}

impl std::fmt::Debug for GatewayModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayModel")
            .field("chat_model_name", &self.chat.model_name())
            .field("guardrails", &self.guardrails)
            .field("env", &self.env)
            .field("app_name", &self.app_name)
            .field("tags", &self.tags)
            .finish()
    }
}

impl GatewayModel {
    /// The underlying model name (post budget degradation).
    pub fn model_name(&self) -> &str {
        self.chat.model_name()
    }

    /// One guarded completion.
    ///
    /// Input guardrails always run; accounting errors are logged and never fail
    /// the call; output guardrails shape the returned content.
    pub async fn invoke(&self, messages: Vec<ChatMessage>) -> Result<ChatCompletion, AgentError> {
        let messages = apply_safety_policies(messages, self.env);
        let messages = apply_input_guardrails(messages, &self.guardrails);

        let mut completion = self.chat.complete(&messages).await?;

        self.record_usage(&completion).await;

        completion.content = apply_output_guardrails(&completion.content, &self.guardrails);
        Ok(completion)
    }

    async fn record_usage(&self, completion: &ChatCompletion) {
        let usage = completion.usage.clone().unwrap_or_default();
        let cost = budget::calculate_cost(
            &completion.model,
            usage.prompt_tokens,
            usage.completion_tokens,
        );

        if let Err(e) = self
            .store
            .add_cost(self.tags.user(), &completion.model, cost, &usage)
            .await
        {
            error!(error = %e, "usage accounting failed (cost totals)");
        }

        let entry = CallLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            application: self.app_name.clone(),
            user: self.tags.user().to_string(),
            agent_role: self.tags.agent_role.clone(),
            model: completion.model.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost,
            run_id: uuid::Uuid::new_v4().to_string(),
        };
        if let Err(e) = self.store.log_call(&entry).await {
            error!(error = %e, "usage accounting failed (call log)");
        }
    }
}
