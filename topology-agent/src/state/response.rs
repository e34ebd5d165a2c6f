//! UI-facing response types: impact summary, paths, circuits, alarms, comments.
//!
//! The correlator builds these from tool envelopes; serve serializes them verbatim.

use serde::{Deserialize, Serialize};

/// What kind of network element an alarm is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Site,
    Device,
    Circuit,
}

/// One active alarm from the outage feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub alarm_id: String,
    pub element_id: String,
    pub element_type: ElementType,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub severity: String,
    pub message: String,
    pub timestamp: String,
}

/// A computed path between two sites, enriched with per-hop alarms.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathView {
    pub src_site: String,
    pub dst_site: String,
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub hops: Vec<String>,
    #[serde(default)]
    pub alarms: Vec<Alarm>,
    #[serde(default)]
    pub is_impacted: bool,
}

/// An inventory circuit, enriched with alarms keyed by its id or endpoint sites.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    #[serde(alias = "id")]
    pub circuit_id: String,
    #[serde(default)]
    pub src_site: String,
    #[serde(default)]
    pub dst_site: String,
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub alarms: Vec<Alarm>,
    #[serde(default)]
    pub is_impacted: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// One reranked NOC comment from the three-stage comment search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentHit {
    pub comment_id: String,
    pub vector_distance: f64,
    pub rrf_score: f64,
    pub cross_encoder_score: f64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Aggregate impact numbers for the UI header.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub total_circuits: usize,
    pub impacted_circuits: usize,
    pub impacted_customers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The full UI payload assembled by correlation and polished by the responder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiResponse {
    pub view_type: String,
    pub summary: ImpactSummary,
    #[serde(default)]
    pub paths: Vec<PathView>,
    #[serde(default)]
    pub circuits: Vec<Circuit>,
    #[serde(default)]
    pub comments: Vec<CommentHit>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub natural_language_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_state: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: an inventory row keyed `id` still lands in `circuit_id` via the alias.
    #[test]
    fn circuit_accepts_id_alias() {
        let c: Circuit = serde_json::from_value(serde_json::json!({
            "id": "CIR-100",
            "src_site": "DAL01",
            "dst_site": "SAT01",
            "layer": "L2",
            "status": "active"
        }))
        .unwrap();
        assert_eq!(c.circuit_id, "CIR-100");
        assert!(!c.is_impacted);
        assert!(c.alarms.is_empty());
    }

    /// **Scenario**: alarm element types serialize lowercase on the wire.
    #[test]
    fn element_type_wire_format() {
        assert_eq!(
            serde_json::to_value(ElementType::Circuit).unwrap(),
            serde_json::json!("circuit")
        );
        let t: ElementType = serde_json::from_value(serde_json::json!("site")).unwrap();
        assert_eq!(t, ElementType::Site);
    }
}
