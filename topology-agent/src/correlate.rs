//! Correlation and validation: merge tool envelopes into one impact view.
//!
//! Alarms are indexed by `element_id`; circuits attach the union of alarms keyed
//! by their circuit id and endpoint sites, paths attach alarms keyed by hop id.
//! Indexing is associative and commutative, so parallel-group completion order
//! cannot change the result. Every envelope carrying an error surfaces a human
//! warning and marks the response partial. Validation is rule-based by default;
//! an optional LLM judge (tier=validator) may request one refinement pass.

use std::collections::HashMap;
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
use crate::metrics::{COMMENT_RAG_HIT, COMMENT_RAG_MISS, NODE_INVOCATIONS, NODE_LATENCY};
use crate::state::{
    Alarm, Circuit, CommentHit, ImpactSummary, PathView, RequestState, ToolEnvelope, UiResponse,
    Validation, ValidationStatus, ERR_CANCELLED, ERR_CIRCUIT_BREAKER_OPEN,
};

const NODE_NAME: &str = "correlate_validate";

const VALIDATOR_SYSTEM_PROMPT: &str = r#"You are a strict validator for topology and inventory answers.

Given:
- the original user question
- the structured tool results (topology, inventory, comments, memory, hierarchy)
- a candidate UI response (paths, circuits, summary, warnings)

Your job is to:
1. Check if the answer is factually consistent with the tool data.
2. Check if the answer appears complete enough for an NOC/NMC engineer.
3. Identify any obvious gaps or contradictions.

Output a short JSON object:
{
  "status": "ok" | "needs_refinement" | "error",
  "confidence": 0.0-1.0,
  "reasons": ["..."],
  "warnings": ["..."],
  "needs_refinement": true/false
}
"#;

pub struct CorrelateValidateNode {
    gateway: Arc<Gateway>,
    settings: Arc<Settings>,
}

impl CorrelateValidateNode {
    pub fn new(gateway: Arc<Gateway>, settings: Arc<Settings>) -> Self {
        Self { gateway, settings }
    }

    /// Optional LLM judge; any failure degrades to the rule-based verdict.
    async fn judge_needs_refinement(&self, state: &RequestState, draft: &UiResponse) -> bool {
        let tags = TrackingTags {
            user_id: state.session_id.clone().unwrap_or_default(),
            session_id: state.session_id.clone(),
            agent_role: "validator".to_string(),
        };
        let guardrails = GuardrailConfig {
            pii_redaction: true,
            json_enforcement: true,
            ..Default::default()
        };

        let model = match self
            .gateway
            .get_model(ModelTier::Validator, 0.0, tags, guardrails)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "validator judge unavailable");
                return false;
            }
        };

        let tool_results = serde_json::json!({
            "topology": state.topology_data,
            "inventory": state.inventory_data,
            "comments": state.comment_data,
            "outage": state.outage_data,
            "hierarchy": state.hierarchy_data,
            "memory": state.memory_data,
        });
        let user_message = format!(
            "User question:\n{}\n\nTool results (JSON):\n{}\n\nCandidate UI response (JSON):\n{}",
            state.user_input,
            tool_results,
            serde_json::to_value(draft).unwrap_or_default(),
        );

        let messages = vec![
            ChatMessage::system(VALIDATOR_SYSTEM_PROMPT),
            ChatMessage::user(user_message),
        ];

        match model.invoke(messages).await {
            Ok(completion) => serde_json::from_str::<serde_json::Value>(&completion.content)
                .ok()
                .and_then(|v| v.get("needs_refinement").and_then(|b| b.as_bool()))
                .unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "validator judge invoke failed");
                false
            }
        }
    }
}

fn alarms_from(envelope: Option<&ToolEnvelope>) -> Vec<Alarm> {
    envelope
        .and_then(|env| env.field("active_alarms"))
        .and_then(|v| serde_json::from_value::<Vec<Alarm>>(v.clone()).ok())
        .unwrap_or_default()
}

fn circuits_from(envelope: Option<&ToolEnvelope>) -> Vec<Circuit> {
    envelope
        .and_then(|env| env.field("circuits"))
        .and_then(|v| serde_json::from_value::<Vec<Circuit>>(v.clone()).ok())
        .unwrap_or_default()
}

fn paths_from(envelope: Option<&ToolEnvelope>) -> Vec<PathView> {
    envelope
        .and_then(|env| env.field("paths"))
        .and_then(|v| serde_json::from_value::<Vec<PathView>>(v.clone()).ok())
        .unwrap_or_default()
}

fn comments_from(envelope: Option<&ToolEnvelope>) -> Vec<CommentHit> {
    envelope
        .and_then(|env| env.field("comments"))
        .and_then(|v| serde_json::from_value::<Vec<CommentHit>>(v.clone()).ok())
        .unwrap_or_default()
}

fn envelope_warning(tool: &str, error: &str) -> String {
    match error {
        ERR_CIRCUIT_BREAKER_OPEN => format!(
            "Tool '{}' was skipped due to recurring failures (circuit breaker open).",
            tool
        ),
        ERR_CANCELLED => format!("Tool '{}' was cancelled before completion.", tool),
        other => format!("Tool '{}' failed: {}.", tool, other),
    }
}

#[async_trait]
impl Node<RequestState> for CorrelateValidateNode {
    fn id(&self) -> &str {
        NODE_NAME
    }

    async fn run(&self, mut state: RequestState) -> Result<RequestState, AgentError> {
        let start = Instant::now();
        info!(request_id = %state.request_id, node = NODE_NAME, "node_start");

        let plan_rejected = state.validation.status == ValidationStatus::Error;

        // 1. Index alarms by element id.
        let alarms = alarms_from(state.outage_data.as_ref());
        let mut alarms_by_eid: HashMap<&str, Vec<&Alarm>> = HashMap::new();
        for alarm in &alarms {
            alarms_by_eid
                .entry(alarm.element_id.as_str())
                .or_default()
                .push(alarm);
        }

        // 2. Enrich circuits: direct alarms plus endpoint-site alarms.
        let mut circuits = circuits_from(state.inventory_data.as_ref());
        let mut impacted_circuits = 0usize;
        for circuit in &mut circuits {
            let mut attached: Vec<Alarm> = Vec::new();
            for key in [&circuit.circuit_id, &circuit.src_site, &circuit.dst_site] {
                if let Some(found) = alarms_by_eid.get(key.as_str()) {
                    attached.extend(found.iter().map(|a| (*a).clone()));
                }
            }
            circuit.is_impacted = !attached.is_empty();
            circuit.alarms = attached;
            if circuit.is_impacted {
                impacted_circuits += 1;
            }
        }

        // 3. Enrich paths by hop id.
        let mut paths = paths_from(state.topology_data.as_ref());
        let mut hops_checked = 0usize;
        for path in &mut paths {
            let mut attached: Vec<Alarm> = Vec::new();
            for hop in &path.hops {
                hops_checked += 1;
                if let Some(found) = alarms_by_eid.get(hop.as_str()) {
                    attached.extend(found.iter().map(|a| (*a).clone()));
                }
            }
            path.is_impacted = !attached.is_empty();
            path.alarms = attached;
        }

        // 4. Comment RAG metrics.
        let comments = comments_from(state.comment_data.as_ref());
        if state.comment_data.is_some() {
            if comments.is_empty() {
                COMMENT_RAG_MISS.inc();
            } else {
                COMMENT_RAG_HIT.inc();
            }
        }

        // 5. Warnings and partial flag from envelope errors; executor warnings
        //    (unresolved refs, rejected plans) are already in validation.warnings.
        let mut warnings = std::mem::take(&mut state.validation.warnings);
        let mut partial = plan_rejected;
        for (tool, envelope) in state.envelopes() {
            if let Some(error) = envelope.and_then(|env| env.error.as_deref()) {
                warnings.push(envelope_warning(tool, error));
                partial = true;
            }
        }

        let total_circuits = circuits.len();
        let summary = ImpactSummary {
            total_circuits,
            impacted_circuits,
            impacted_customers: 0,
            notes: Some(
                "Correlation complete. Alarms merged into circuits and topology paths."
                    .to_string(),
            ),
        };

        let draft = UiResponse {
            view_type: if paths.is_empty() {
                "circuit_view".to_string()
            } else {
                "path_view".to_string()
            },
            summary,
            paths,
            circuits,
            comments,
            warnings: warnings.clone(),
            partial,
            natural_language_summary: format!(
                "Found {} circuits, {} of which are impacted by active outages.",
                total_circuits, impacted_circuits
            ),
            debug_state: Some(serde_json::json!({
                "num_alarms": alarms.len(),
                "num_hops_checked": hops_checked,
            })),
        };

        // 6. Validation: rule-based, optionally sharpened by the LLM judge. A
        //    rejected plan keeps its error status and never re-plans.
        let needs_refinement = if plan_rejected {
            false
        } else if self.settings.validator_judge_enabled {
            self.judge_needs_refinement(&state, &draft).await
        } else {
            false
        };

        let status = if plan_rejected {
            ValidationStatus::Error
        } else if partial {
            ValidationStatus::Partial
        } else {
            ValidationStatus::Ok
        };

        state.validation = Validation {
            status,
            needs_refinement,
            warnings,
        };
        state.partial = partial;
        state.ui_response = draft;

        NODE_INVOCATIONS.with_label_values(&[NODE_NAME, "ok"]).inc();
        NODE_LATENCY
            .with_label_values(&[NODE_NAME])
            .observe(start.elapsed().as_secs_f64());
        info!(
            request_id = %state.request_id,
            total_circuits,
            impacted = impacted_circuits,
            partial,
            "node_completed"
        );
        Ok(state)
    }
}
