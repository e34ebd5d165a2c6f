//! Typed execution plan: strategy, steps, and dataflow references.
//!
//! The planner LLM emits a JSON plan; it is validated once at the edge into these
//! types so the executor never touches loose JSON. `$ref:<step>.output.<field>`
//! tokens become [`ParamValue::Ref`] instead of staying sentinel strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// The closed set of tools a plan step may name.
///
/// `Unauthorized` is never planned directly: the gateway's RBAC guardrail rewrites
/// restricted tools (reboot, config push, outage remediation) into it, and the
/// executor refuses such steps with an error envelope instead of running them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "topology_tool")]
    Topology,
    #[serde(rename = "inventory_tool")]
    Inventory,
    #[serde(rename = "outage_tool")]
    Outage,
    #[serde(rename = "comments_search_tool", alias = "comment_tool")]
    CommentsSearch,
    #[serde(rename = "hierarchy_tool")]
    Hierarchy,
    #[serde(rename = "memory_search_tool", alias = "memory_tool")]
    MemorySearch,
    #[serde(rename = "unauthorized_tool")]
    Unauthorized,
}

impl ToolKind {
    /// Wire name, matching the planner grammar.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Topology => "topology_tool",
            ToolKind::Inventory => "inventory_tool",
            ToolKind::Outage => "outage_tool",
            ToolKind::CommentsSearch => "comments_search_tool",
            ToolKind::Hierarchy => "hierarchy_tool",
            ToolKind::MemorySearch => "memory_search_tool",
            ToolKind::Unauthorized => "unauthorized_tool",
        }
    }

    /// The tools a fallback plan invokes, in fixed order (determinism matters:
    /// two fallback plans for identical inputs must serialize identically).
    pub fn fallback_order() -> [ToolKind; 6] {
        [
            ToolKind::Topology,
            ToolKind::Inventory,
            ToolKind::Outage,
            ToolKind::CommentsSearch,
            ToolKind::Hierarchy,
            ToolKind::MemorySearch,
        ]
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step parameter: either a literal JSON value or a reference to a prior
/// step's output field, resolved by the executor at step-launch time.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Literal(serde_json::Value),
    Ref { step: String, field: String },
}

impl ParamValue {
    /// Parses the `$ref:<step>.output.<field>` token; anything else is `None`.
    pub fn parse_ref(s: &str) -> Option<(String, String)> {
        let rest = s.strip_prefix("$ref:")?;
        let (step, field) = rest.split_once(".output.")?;
        if step.is_empty() || field.is_empty() || field.contains('.') {
            return None;
        }
        Some((step.to_string(), field.to_string()))
    }

    /// Renders a reference back to its wire token.
    pub fn ref_token(step: &str, field: &str) -> String {
        format!("$ref:{}.output.{}", step, field)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Literal(v) => v.serialize(serializer),
            ParamValue::Ref { step, field } => {
                serializer.serialize_str(&Self::ref_token(step, field))
            }
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::String(s) = &value {
            if let Some((step, field)) = Self::parse_ref(s) {
                return Ok(ParamValue::Ref { step, field });
            }
            if s.starts_with("$ref:") {
                return Err(de::Error::custom(format!("malformed reference token: {}", s)));
            }
        }
        Ok(ParamValue::Literal(value))
    }
}

/// One planned tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: String,
    pub tool: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
    /// Set by the RBAC output guardrail when a restricted tool was rewritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    /// Bare step calling one tool with no params and no dependencies.
    pub fn simple(id: impl Into<String>, tool: ToolKind) -> Self {
        Self {
            id: id.into(),
            tool,
            purpose: None,
            params: BTreeMap::new(),
            depends_on: Vec::new(),
            parallel_group: None,
            error: None,
        }
    }
}

/// A validated plan: strategy text, step DAG, free-form metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a `$ref` token deserializes into the Ref variant and serializes back
    /// to the identical token.
    #[test]
    fn param_value_ref_roundtrip() {
        let v: ParamValue = serde_json::from_value(serde_json::json!(
            "$ref:step_1.output.device_ids"
        ))
        .unwrap();
        assert_eq!(
            v,
            ParamValue::Ref {
                step: "step_1".into(),
                field: "device_ids".into()
            }
        );
        let back = serde_json::to_value(&v).unwrap();
        assert_eq!(back, serde_json::json!("$ref:step_1.output.device_ids"));
    }

    /// **Scenario**: ordinary strings, lists, and objects stay literals.
    #[test]
    fn param_value_literal_passthrough() {
        let v: ParamValue = serde_json::from_value(serde_json::json!(["Dallas", "Austin"])).unwrap();
        assert!(matches!(v, ParamValue::Literal(_)));
        let v: ParamValue = serde_json::from_value(serde_json::json!("plain string")).unwrap();
        assert!(matches!(v, ParamValue::Literal(_)));
    }

    /// **Scenario**: a malformed `$ref:` token is rejected at parse time rather than
    /// silently treated as a literal.
    #[test]
    fn param_value_malformed_ref_rejected() {
        let r: Result<ParamValue, _> =
            serde_json::from_value(serde_json::json!("$ref:step_1.device_ids"));
        assert!(r.is_err());
    }

    /// **Scenario**: tool names on the wire map to the closed enum, including the
    /// legacy `comment_tool` alias; unknown names fail.
    #[test]
    fn tool_kind_wire_names() {
        let t: ToolKind = serde_json::from_value(serde_json::json!("comments_search_tool")).unwrap();
        assert_eq!(t, ToolKind::CommentsSearch);
        let t: ToolKind = serde_json::from_value(serde_json::json!("comment_tool")).unwrap();
        assert_eq!(t, ToolKind::CommentsSearch);
        let r: Result<ToolKind, _> = serde_json::from_value(serde_json::json!("reboot_tool"));
        assert!(r.is_err());
    }

    /// **Scenario**: a full plan JSON with depends_on and parallel_group parses into
    /// typed steps with a Ref param.
    #[test]
    fn plan_deserializes_typed_steps() {
        let plan: Plan = serde_json::from_value(serde_json::json!({
            "strategy": "resolve then enrich",
            "steps": [
                {"id": "step_1", "tool": "topology_tool", "params": {"sites": ["Dallas POP", "San Antonio"]}, "depends_on": []},
                {"id": "step_2", "tool": "outage_tool",
                 "params": {"circuit_ids": "$ref:step_1.output.circuit_ids"},
                 "depends_on": ["step_1"], "parallel_group": "enrich"}
            ],
            "metadata": {"ui_context_used": true}
        }))
        .unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].tool, ToolKind::Outage);
        assert_eq!(plan.steps[1].parallel_group.as_deref(), Some("enrich"));
        assert_eq!(
            plan.steps[1].params.get("circuit_ids"),
            Some(&ParamValue::Ref {
                step: "step_1".into(),
                field: "circuit_ids".into()
            })
        );
    }
}
