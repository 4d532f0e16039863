//! Evidence construction and blending.
//!
//! Every `CONCERN:` line the planner emits is turned into a typed
//! [`Evidence`] item — but only when the cited node is actually in the
//! subview, so the citation-grounding invariant holds by construction.
//! Weights combine three factors: gateway-reported signal strength, the
//! model's own importance, and a hop-depth decay.

use std::collections::BTreeMap;

use graph_gateway::{EdgeKind, NodeId, NodeKind};

use crate::model::{Evidence, Provenance};

use super::policy::ConcernLine;
use super::subview::GraphSubview;

/// Weight decay per hop (hop 1 → index 0).
pub const HOP_DECAY: [f32; 3] = [1.0, 0.8, 0.6];

/// Default signal strength when the subview has no weighted edge for the
/// cited node.
const DEFAULT_SIGNAL: f32 = 0.5;

/// Blend weights over evidence categories (spec-fixed).
const BLEND_INCIDENT: f32 = 0.5;
const BLEND_CO_CHANGE: f32 = 0.3;
const BLEND_OWNERSHIP: f32 = 0.2;

/// Convert validated concern lines into evidence items.
///
/// Concerns citing nodes outside the subview are dropped.
pub fn from_concerns(
    concerns: &[ConcernLine],
    subview: &GraphSubview,
    hop_index: u8,
) -> Vec<Evidence> {
    let decay = HOP_DECAY
        .get((hop_index as usize).saturating_sub(1))
        .copied()
        .unwrap_or(0.6);

    concerns
        .iter()
        .filter_map(|c| {
            let id = NodeId(c.node_id.clone());
            let node = subview.node(&id)?;
            let signal = subview.signal_strength(&id).unwrap_or(DEFAULT_SIGNAL);
            let weight = (signal * c.importance * decay).clamp(0.0, 1.0);
            let provenance = Provenance {
                query: "neighbors".to_string(),
                hop: hop_index,
            };
            let human_description = c.text.clone();

            Some(match node.kind {
                NodeKind::Incident => Evidence::Incident {
                    source_node_id: id,
                    weight,
                    human_description,
                    provenance,
                },
                NodeKind::Developer => Evidence::Ownership {
                    source_node_id: id,
                    weight,
                    human_description,
                    provenance,
                },
                NodeKind::Function => Evidence::Structural {
                    source_node_id: id,
                    weight,
                    human_description,
                    provenance,
                },
                NodeKind::Commit => Evidence::Semantic {
                    source_node_id: id,
                    weight,
                    human_description,
                    provenance,
                },
                NodeKind::File => match subview.dominant_edge_kind(&id) {
                    Some(EdgeKind::CausedBy) => Evidence::Incident {
                        source_node_id: id,
                        weight,
                        human_description,
                        provenance,
                    },
                    Some(EdgeKind::CoChanged) => Evidence::CoChange {
                        source_node_id: id,
                        weight,
                        human_description,
                        provenance,
                    },
                    Some(EdgeKind::AuthoredBy) => Evidence::Ownership {
                        source_node_id: id,
                        weight,
                        human_description,
                        provenance,
                    },
                    Some(EdgeKind::Imports) | Some(EdgeKind::Calls) => Evidence::Dependency {
                        source_node_id: id,
                        weight,
                        human_description,
                        provenance,
                    },
                    None => Evidence::Semantic {
                        source_node_id: id,
                        weight,
                        human_description,
                        provenance,
                    },
                },
            })
        })
        .collect()
}

/// Blend the evidence pool into a [0,100] score plus per-category values.
/// Per category the strongest item counts.
pub fn blend(evidence: &[Evidence]) -> (f32, BTreeMap<String, f32>) {
    let mut incident = 0.0_f32;
    let mut co_change = 0.0_f32;
    let mut ownership = 0.0_f32;
    for e in evidence {
        match e {
            Evidence::Incident { weight, .. } => incident = incident.max(*weight),
            Evidence::CoChange { weight, .. } => co_change = co_change.max(*weight),
            Evidence::Ownership { weight, .. } => ownership = ownership.max(*weight),
            // Dependency/structural/semantic items inform the narrative
            // and citations but not the blended score.
            _ => {}
        }
    }

    let score =
        (BLEND_INCIDENT * incident + BLEND_CO_CHANGE * co_change + BLEND_OWNERSHIP * ownership)
            * 100.0;

    let mut categories = BTreeMap::new();
    categories.insert("incident".to_string(), incident);
    categories.insert("co_change".to_string(), co_change);
    categories.insert("ownership".to_string(), ownership);

    (score.clamp(0.0, 100.0), categories)
}

/// Digest of the strongest evidence, fed into the synthesis prompt and
/// the heuristic summary fallback.
pub fn digest(evidence: &[Evidence], limit: usize) -> String {
    let mut sorted: Vec<&Evidence> = evidence.iter().collect();
    sorted.sort_by(|a, b| {
        b.weight()
            .partial_cmp(&a.weight())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
        .iter()
        .take(limit)
        .map(|e| {
            format!(
                "- [{}] {:.2} {} {}\n",
                e.kind_str(),
                e.weight(),
                e.source_node_id(),
                e.human_description()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_gateway::{GraphEdge, GraphNode, Neighborhood};

    fn subview() -> GraphSubview {
        let mut s = GraphSubview::default();
        s.merge(Neighborhood {
            nodes: vec![
                GraphNode {
                    id: NodeId("file:a.rs".into()),
                    kind: NodeKind::File,
                    label: "a.rs".into(),
                },
                GraphNode {
                    id: NodeId("file:b.rs".into()),
                    kind: NodeKind::File,
                    label: "b.rs".into(),
                },
                GraphNode {
                    id: NodeId("incident:7".into()),
                    kind: NodeKind::Incident,
                    label: "payment outage".into(),
                },
                GraphNode {
                    id: NodeId("dev:alice".into()),
                    kind: NodeKind::Developer,
                    label: "alice".into(),
                },
            ],
            edges: vec![GraphEdge {
                src: NodeId("file:a.rs".into()),
                dst: NodeId("file:b.rs".into()),
                kind: EdgeKind::CoChanged,
                weight: 0.9,
                last_touched: None,
            }],
            truncated: false,
        });
        s
    }

    fn concern(node: &str, importance: f32) -> ConcernLine {
        ConcernLine {
            importance,
            node_id: node.to_string(),
            text: "reason".to_string(),
        }
    }

    #[test]
    fn kinds_follow_node_and_edge_types() {
        let s = subview();
        let evidence = from_concerns(
            &[
                concern("file:b.rs", 1.0),
                concern("incident:7", 1.0),
                concern("dev:alice", 1.0),
            ],
            &s,
            1,
        );
        assert_eq!(evidence.len(), 3);
        assert!(matches!(evidence[0], Evidence::CoChange { .. }));
        assert!(matches!(evidence[1], Evidence::Incident { .. }));
        assert!(matches!(evidence[2], Evidence::Ownership { .. }));
    }

    #[test]
    fn unknown_citations_are_dropped() {
        let s = subview();
        let evidence = from_concerns(&[concern("file:ghost.rs", 1.0)], &s, 1);
        assert!(evidence.is_empty());
    }

    #[test]
    fn weight_combines_signal_importance_and_decay() {
        let s = subview();
        // b.rs: signal 0.9 × importance 0.5 × hop-2 decay 0.8 = 0.36.
        let evidence = from_concerns(&[concern("file:b.rs", 0.5)], &s, 2);
        assert!((evidence[0].weight() - 0.36).abs() < 1e-6);
        // incident:7 has no weighted edge → default signal 0.5, hop 1.
        let evidence = from_concerns(&[concern("incident:7", 1.0)], &s, 1);
        assert!((evidence[0].weight() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blend_uses_spec_weights() {
        let s = subview();
        let evidence = from_concerns(
            &[concern("incident:7", 1.0), concern("file:b.rs", 1.0)],
            &s,
            1,
        );
        let (score, cats) = blend(&evidence);
        // incident 0.5 (default signal), co_change 0.9, ownership 0.
        let expected = (0.5 * 0.5 + 0.3 * 0.9) * 100.0;
        assert!((score - expected).abs() < 1e-3);
        assert!((cats["co_change"] - 0.9).abs() < 1e-6);
        assert_eq!(cats["ownership"], 0.0);
    }

    #[test]
    fn digest_orders_by_weight() {
        let s = subview();
        let evidence = from_concerns(
            &[concern("incident:7", 0.4), concern("file:b.rs", 1.0)],
            &s,
            1,
        );
        let d = digest(&evidence, 5);
        let co_pos = d.find("co_change").unwrap();
        let inc_pos = d.find("incident").unwrap();
        assert!(co_pos < inc_pos);
    }
}
