//! Typed view of the knowledge graph.
//!
//! Node ids are stable strings of the form `<kind>:<key>` (`file:src/a.rs`,
//! `dev:alice`, `incident:42`) assigned by the ingester. The gateway never
//! invents ids; everything it returns resolves back through
//! [`crate::GraphGateway::resolve_node`].

use serde::{Deserialize, Serialize};

/// Stable node identifier (`<kind>:<key>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn file(path: &str) -> Self {
        Self(format!("file:{path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `<key>` part after the kind prefix.
    pub fn key(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, k)| k)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Function,
    Developer,
    Commit,
    Incident,
}

/// Kind of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// File → File.
    Imports,
    /// Function → Function.
    Calls,
    /// File ↔ File, weighted by co-change frequency.
    CoChanged,
    /// File → Developer, weighted by commit share.
    AuthoredBy,
    /// Incident → File.
    CausedBy,
}

/// One node as stored in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Small human-readable label shown to the investigation planner.
    pub label: String,
}

/// One directed edge as stored in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub src: NodeId,
    pub dst: NodeId,
    pub kind: EdgeKind,
    /// Signal strength in [0,1] where meaningful (co-change frequency,
    /// commit share); 1.0 for structural edges.
    #[serde(default = "default_weight")]
    pub weight: f32,
    /// RFC3339 timestamp of the most recent observation backing this edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_touched: Option<String>,
}

fn default_weight() -> f32 {
    1.0
}

/// Bounded result of a neighborhood expansion.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// True when the degree cap trimmed the result.
    pub truncated: bool,
}

/// One co-change partner of a file.
#[derive(Debug, Clone)]
pub struct CoChangePair {
    pub path: String,
    pub frequency: f32,
}

/// One developer's share of a file's history.
#[derive(Debug, Clone)]
pub struct OwnershipShare {
    pub developer: String,
    pub commit_share: f32,
    pub last_touched: Option<String>,
}

/// Incident aggregate for one file.
#[derive(Debug, Clone, Default)]
pub struct IncidentSummary {
    pub count: u32,
    pub severities: Vec<String>,
    pub recent_titles: Vec<String>,
}

/// One ranked hit from incident search.
#[derive(Debug, Clone)]
pub struct IncidentHit {
    pub node_id: NodeId,
    pub title: String,
    pub severity: String,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_key_strips_kind_prefix() {
        assert_eq!(NodeId::file("src/a.rs").key(), "src/a.rs");
        assert_eq!(NodeId("dev:alice".into()).key(), "alice");
        assert_eq!(NodeId("plain".into()).key(), "plain");
    }
}
