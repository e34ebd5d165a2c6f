//! LLM-based planner node.
//!
//! Calls the gateway at tier=planner with the fixed grammar, parses the JSON
//! plan, and validates its structure. Any failure of parse, structure, or
//! tool-name validation emits the deterministic fallback plan (one step per
//! tool, empty params) instead of failing the request.

pub mod prompt;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::gateway::guardrails::GuardrailConfig;
use crate::gateway::{Gateway, ModelTier, TrackingTags};
use crate::graph::Node;
use crate::message::ChatMessage;
use crate::metrics::{NODE_INVOCATIONS, NODE_LATENCY, PLANNER_FALLBACK_USED};
use crate::state::{Plan, RequestState, Step, ToolKind};

use prompt::{build_planner_user_message, PlannerInput, PLANNER_SYSTEM_PROMPT};

const NODE_NAME: &str = "planner";

/// Planner node: question + context in, validated plan out.
pub struct PlannerNode {
    gateway: Arc<Gateway>,
}

impl PlannerNode {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

/// Fallback plan used when the LLM output is invalid or planning fails:
/// call every tool once with empty params. Deterministic: identical inputs
/// serialize byte-identically.
pub fn fallback_plan(user_input: &str) -> Plan {
    PLANNER_FALLBACK_USED.inc();

    let steps = ToolKind::fallback_order()
        .into_iter()
        .map(|tool| {
            let short = tool
                .as_str()
                .trim_end_matches("_tool")
                .trim_end_matches("_search");
            Step::simple(format!("step_{}", short), tool)
        })
        .collect();

    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "from_user_input".to_string(),
        serde_json::Value::String(user_input.to_string()),
    );
    metadata.insert(
        "fallback_reason".to_string(),
        serde_json::Value::String("llm_planner_failed_or_invalid_json".to_string()),
    );

    Plan {
        strategy: "fallback_simple".to_string(),
        description: Some("Fallback: call all tools once and correlate results.".to_string()),
        steps,
        metadata,
    }
}

/// Strips a leading/trailing markdown fence if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline, then the closing fence.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parses and validates the model output into a [`Plan`].
///
/// On success, missing step ids default to `step_<index>` and missing params to
/// `{}`. On any failure the error string describes what was wrong; the caller
/// substitutes the fallback plan.
pub fn parse_plan(raw: &str) -> Result<Plan, String> {
    let cleaned = strip_code_fences(raw);

    let mut value: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|e| format!("JSON parse error: {}", e))?;

    if !value.is_object() {
        return Err("planner output is not a JSON object".to_string());
    }
    let Some(steps) = value.get_mut("steps").and_then(|s| s.as_array_mut()) else {
        return Err("planner output missing 'steps'".to_string());
    };
    if steps.is_empty() {
        return Err("planner 'steps' must be a non-empty list".to_string());
    }

    for (idx, step) in steps.iter_mut().enumerate() {
        let Some(obj) = step.as_object_mut() else {
            return Err(format!("invalid step at index {}: not an object", idx));
        };
        if !obj.get("tool").map(serde_json::Value::is_string).unwrap_or(false) {
            return Err(format!("invalid step at index {}: missing tool", idx));
        }
        obj.entry("id".to_string())
            .or_insert_with(|| serde_json::Value::String(format!("step_{}", idx)));
        obj.entry("params".to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        // Null parallel_group is the grammar's "no group"; drop it before typing.
        if obj.get("parallel_group").map(serde_json::Value::is_null) == Some(true) {
            obj.remove("parallel_group");
        }
        if obj.get("purpose").map(serde_json::Value::is_null) == Some(true) {
            obj.remove("purpose");
        }
    }

    serde_json::from_value::<Plan>(value).map_err(|e| format!("plan validation error: {}", e))
}

#[async_trait]
impl Node<RequestState> for PlannerNode {
    fn id(&self) -> &str {
        NODE_NAME
    }

    async fn run(&self, mut state: RequestState) -> Result<RequestState, AgentError> {
        let start = Instant::now();
        let question = state.user_input.trim().to_string();

        info!(
            request_id = %state.request_id,
            node = NODE_NAME,
            has_previous_plan = !state.plan.is_empty(),
            retry_count = state.retry_count,
            "node_start"
        );

        if question.is_empty() {
            // Degenerate case: no question; just use the fallback plan.
            info!(request_id = %state.request_id, "planner_empty_question_using_fallback");
            state.plan = fallback_plan(&state.user_input);
            state.plan_raw = String::new();
            NODE_INVOCATIONS.with_label_values(&[NODE_NAME, "ok"]).inc();
            NODE_LATENCY
                .with_label_values(&[NODE_NAME])
                .observe(start.elapsed().as_secs_f64());
            return Ok(state);
        }

        let tags = TrackingTags {
            user_id: state.session_id.clone().unwrap_or_default(),
            session_id: state.session_id.clone(),
            agent_role: NODE_NAME.to_string(),
        };
        let guardrails = GuardrailConfig {
            pii_redaction: true,
            json_enforcement: true,
            ..Default::default()
        };

        let model = match self
            .gateway
            .get_model(ModelTier::Planner, 0.0, tags, guardrails)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(request_id = %state.request_id, error = %e, "planner model handle failed");
                state.planning_error = Some(format!("planner model unavailable: {}", e));
                state.plan = fallback_plan(&state.user_input);
                state.plan_raw = String::new();
                NODE_INVOCATIONS.with_label_values(&[NODE_NAME, "ok"]).inc();
                NODE_LATENCY
                    .with_label_values(&[NODE_NAME])
                    .observe(start.elapsed().as_secs_f64());
                return Ok(state);
            }
        };

        let previous_plan = if state.plan.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::to_value(&state.plan).unwrap_or_else(|_| serde_json::json!({}))
        };
        let validation_feedback =
            serde_json::to_value(&state.validation).unwrap_or_else(|_| serde_json::json!({}));

        let user_message = build_planner_user_message(&PlannerInput {
            question: &question,
            ui_context: serde_json::to_value(&state.ui_context)
                .unwrap_or_else(|_| serde_json::json!({})),
            history: serde_json::Value::Array(state.history.clone()),
            memory_snippets: serde_json::Value::Array(state.semantic_memory.clone()),
            previous_plan,
            validation_feedback,
        });

        let messages = vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(user_message),
        ];

        match model.invoke(messages).await {
            Ok(completion) => {
                state.plan_raw = completion.content.clone();
                match parse_plan(&completion.content) {
                    Ok(plan) => {
                        info!(
                            request_id = %state.request_id,
                            strategy = %plan.strategy,
                            num_steps = plan.steps.len(),
                            "planner_llm_invoke_success"
                        );
                        state.planning_error = None;
                        state.plan = plan;
                    }
                    Err(reason) => {
                        warn!(
                            request_id = %state.request_id,
                            reason = %reason,
                            raw_snippet = %completion.content.chars().take(200).collect::<String>(),
                            "planner_llm_output_invalid"
                        );
                        state.planning_error = Some(reason);
                        state.plan = fallback_plan(&state.user_input);
                    }
                }
            }
            Err(e) => {
                warn!(request_id = %state.request_id, error = %e, "planner_llm_invoke_failed");
                state.planning_error = Some(format!("planner LLM invoke error: {}", e));
                state.plan = fallback_plan(&state.user_input);
                state.plan_raw = String::new();
            }
        }

        NODE_INVOCATIONS.with_label_values(&[NODE_NAME, "ok"]).inc();
        NODE_LATENCY
            .with_label_values(&[NODE_NAME])
            .observe(start.elapsed().as_secs_f64());
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::backends::MockChat;
    use crate::gateway::storage::FileUsageStore;
    use env_config::{BackendKind, Settings};

    fn mock_gateway(dir: &tempfile::TempDir, mock: Arc<MockChat>) -> Arc<Gateway> {
        let settings = Arc::new(Settings {
            llm_backend: BackendKind::Mock,
            fallback_backend: BackendKind::Mock,
            ..Settings::default()
        });
        let store = Arc::new(FileUsageStore::new(
            dir.path().join("usage.json"),
            dir.path().join("calls.jsonl"),
        ));
        Arc::new(Gateway::new(settings, store).with_mock_backend(mock))
    }

    /// **Scenario**: a well-formed plan parses; a step without an id gets
    /// `step_<index>` and empty params.
    #[test]
    fn parse_plan_defaults_missing_fields() {
        let plan = parse_plan(
            r#"{"strategy": "s", "steps": [
                {"tool": "topology_tool"},
                {"id": "named", "tool": "outage_tool", "params": {"severity": ["all"]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(plan.steps[0].id, "step_0");
        assert!(plan.steps[0].params.is_empty());
        assert_eq!(plan.steps[1].id, "named");
    }

    /// **Scenario**: fenced output still parses after fence stripping.
    #[test]
    fn parse_plan_strips_fences() {
        let plan = parse_plan(
            "```json\n{\"strategy\": \"s\", \"steps\": [{\"tool\": \"inventory_tool\"}]}\n```",
        )
        .unwrap();
        assert_eq!(plan.steps[0].tool, ToolKind::Inventory);
    }

    /// **Scenario**: missing steps, empty steps, and unknown tools are each
    /// rejected with a describing reason.
    #[test]
    fn parse_plan_rejects_bad_structure() {
        assert!(parse_plan("not json at all").unwrap_err().contains("JSON parse error"));
        assert!(parse_plan(r#"{"strategy": "s"}"#).unwrap_err().contains("missing 'steps'"));
        assert!(parse_plan(r#"{"steps": []}"#).unwrap_err().contains("non-empty"));
        assert!(parse_plan(r#"{"steps": [{"params": {}}]}"#)
            .unwrap_err()
            .contains("missing tool"));
        assert!(parse_plan(r#"{"steps": [{"tool": "reboot_tool"}]}"#)
            .unwrap_err()
            .contains("validation error"));
    }

    /// **Scenario**: two identical planner failures produce byte-identical
    /// fallback plans, and the fallback counter increments by exactly one per use.
    #[test]
    fn fallback_plan_is_deterministic() {
        let before = PLANNER_FALLBACK_USED.get();
        let a = fallback_plan("Show me the path from Dallas to Austin");
        let b = fallback_plan("Show me the path from Dallas to Austin");
        assert_eq!(PLANNER_FALLBACK_USED.get(), before + 2);

        let a_bytes = serde_json::to_vec(&a).unwrap();
        let b_bytes = serde_json::to_vec(&b).unwrap();
        assert_eq!(a_bytes, b_bytes);

        assert_eq!(a.strategy, "fallback_simple");
        assert_eq!(a.steps.len(), 6);
        assert_eq!(a.steps[0].id, "step_topology");
        assert!(a.steps.iter().all(|s| s.params.is_empty()));
    }

    /// **Scenario**: unparseable model output ("sure! here's a plan ```json { not
    /// valid") sets planning_error, uses the fallback plan, and bumps the fallback
    /// counter by exactly 1.
    #[tokio::test]
    async fn invalid_model_output_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockChat::with_content("sure! here's a plan ```json { not valid"));
        let gateway = mock_gateway(&dir, mock);
        let node = PlannerNode::new(gateway);

        let before = PLANNER_FALLBACK_USED.get();
        let state = node
            .run(RequestState::new("Show me the path from Dallas to Austin", "req-1"))
            .await
            .unwrap();

        assert_eq!(PLANNER_FALLBACK_USED.get(), before + 1);
        assert_eq!(state.plan.strategy, "fallback_simple");
        assert!(state.planning_error.is_some());
        assert!(!state.plan_raw.is_empty());
    }

    /// **Scenario**: a valid plan from the model is stored typed, with no
    /// planning error.
    #[tokio::test]
    async fn valid_model_output_becomes_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockChat::with_content(
            r#"{"strategy": "path then outages", "steps": [
                {"id": "step_1", "tool": "topology_tool", "params": {"sites": ["Dallas", "Austin"]}, "depends_on": []},
                {"id": "step_2", "tool": "outage_tool",
                 "params": {"circuit_ids": "$ref:step_1.output.circuit_ids"},
                 "depends_on": ["step_1"]}
            ]}"#,
        ));
        let gateway = mock_gateway(&dir, mock);
        let node = PlannerNode::new(gateway);

        let state = node
            .run(RequestState::new("path Dallas to Austin with outages", "req-2"))
            .await
            .unwrap();

        assert!(state.planning_error.is_none());
        assert_eq!(state.plan.steps.len(), 2);
        assert_eq!(state.plan.steps[1].depends_on, vec!["step_1"]);
    }

    /// **Scenario**: an empty question short-circuits to the fallback plan without
    /// a model call.
    #[tokio::test]
    async fn empty_question_skips_model() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockChat::with_content("unused"));
        let gateway = mock_gateway(&dir, mock.clone());
        let node = PlannerNode::new(gateway);

        let state = node.run(RequestState::new("   ", "req-3")).await.unwrap();

        assert_eq!(state.plan.strategy, "fallback_simple");
        assert!(mock.received().is_empty());
    }
}
