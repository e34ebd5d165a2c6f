//! Responder: polish the natural-language summary via the response tier.
//!
//! Sends a trimmed subset of the UI payload (summary, top-N paths and circuits,
//! warnings) plus the deterministic draft to the gateway. On success the
//! polished text overwrites `natural_language_summary`; on any failure the
//! draft is preserved. The model is told to never invent data.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use env_config::Settings;

use crate::error::AgentError;
use crate::gateway::guardrails::GuardrailConfig;
use crate::gateway::{Gateway, ModelTier, TrackingTags};
use crate::graph::Node;
use crate::message::ChatMessage;
use crate::metrics::{NODE_INVOCATIONS, NODE_LATENCY};
use crate::state::RequestState;

const NODE_NAME: &str = "respond";

const RESPONSE_SYSTEM_PROMPT: &str = r#"You are a helpful network operations assistant.

You receive:
- the original user question
- structured topology and inventory data
- a machine-generated summary

Your goal is to produce a clear, concise natural language explanation
for a NOC/NMC engineer. Use accurate, neutral language and avoid hallucinations.
If some information is missing, say so explicitly.

Do NOT invent circuits, sites, or customers that are not present in the data.
"#;

pub struct ResponseNode {
    gateway: Arc<Gateway>,
    settings: Arc<Settings>,
}

impl ResponseNode {
    pub fn new(gateway: Arc<Gateway>, settings: Arc<Settings>) -> Self {
        Self { gateway, settings }
    }

    fn trimmed_payload(&self, state: &RequestState) -> serde_json::Value {
        let top_n = self.settings.response_top_n;
        let ui = &state.ui_response;
        serde_json::json!({
            "summary": ui.summary,
            "view_type": ui.view_type,
            "paths": ui.paths.iter().take(top_n).collect::<Vec<_>>(),
            "circuits": ui.circuits.iter().take(top_n).collect::<Vec<_>>(),
            "warnings": ui.warnings,
            "partial": ui.partial,
        })
    }
}

#[async_trait]
impl Node<RequestState> for ResponseNode {
    fn id(&self) -> &str {
        NODE_NAME
    }

    async fn run(&self, mut state: RequestState) -> Result<RequestState, AgentError> {
        let start = Instant::now();
        info!(request_id = %state.request_id, node = NODE_NAME, "node_start");

        let draft = state.ui_response.natural_language_summary.clone();
        let tags = TrackingTags {
            user_id: state.session_id.clone().unwrap_or_default(),
            session_id: state.session_id.clone(),
            agent_role: NODE_NAME.to_string(),
        };
        let guardrails = GuardrailConfig {
            pii_redaction: true,
            ..Default::default()
        };

        let polished = match self
            .gateway
            .get_model(ModelTier::Response, 0.2, tags, guardrails)
            .await
        {
            Ok(model) => {
                let user_message = format!(
                    "User question:\n{}\n\nStructured data (JSON):\n{}\n\nDraft summary:\n{}",
                    state.user_input,
                    self.trimmed_payload(&state),
                    draft,
                );
                match model
                    .invoke(vec![
                        ChatMessage::system(RESPONSE_SYSTEM_PROMPT),
                        ChatMessage::user(user_message),
                    ])
                    .await
                {
                    Ok(completion) => {
                        let text = completion.content.trim().to_string();
                        if text.is_empty() {
                            None
                        } else {
                            Some(text)
                        }
                    }
                    Err(e) => {
                        warn!(request_id = %state.request_id, error = %e, "response polish failed");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(request_id = %state.request_id, error = %e, "response model unavailable");
                None
            }
        };

        if let Some(text) = polished {
            state.ui_response.natural_language_summary = text;
        } else {
            state.ui_response.natural_language_summary = draft;
        }

        NODE_INVOCATIONS.with_label_values(&[NODE_NAME, "ok"]).inc();
        NODE_LATENCY
            .with_label_values(&[NODE_NAME])
            .observe(start.elapsed().as_secs_f64());
        Ok(state)
    }
}
