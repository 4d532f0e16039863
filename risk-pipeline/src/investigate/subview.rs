//! The graph subview shown to the planner.
//!
//! A [`GraphSubview`] is the investigator's working set: every node and
//! edge the model has been shown so far. It doubles as the validation
//! surface for expansion requests — the model may only name nodes that
//! are already in the subview, which keeps a prompt-injected response
//! from steering the gateway to arbitrary reads.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use tracing::debug;

use git_diff_engine::Diff;
use graph_gateway::{EdgeKind, GraphGateway, GraphNode, Neighborhood, NodeId, NodeKind};

/// Edge kinds pulled into the initial 1-hop neighborhood.
pub const INITIAL_EDGE_KINDS: [EdgeKind; 4] = [
    EdgeKind::Imports,
    EdgeKind::CoChanged,
    EdgeKind::AuthoredBy,
    EdgeKind::CausedBy,
];

/// Cap on nodes rendered into one prompt.
const RENDER_NODE_CAP: usize = 60;
/// Cap on edges rendered into one prompt.
const RENDER_EDGE_CAP: usize = 80;

/// Nodes and edges accumulated over the investigation.
///
/// Node ordering is deterministic (BTreeMap) so identical investigations
/// render identical prompts.
#[derive(Debug, Default)]
pub struct GraphSubview {
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: Vec<graph_gateway::GraphEdge>,
    edge_seen: HashSet<(NodeId, NodeId, EdgeKind)>,
}

impl GraphSubview {
    /// Collect the initial 1-hop neighborhood of every changed file.
    ///
    /// Gateway failures degrade: the file's neighborhood is simply absent
    /// and a warning is recorded.
    pub async fn collect_initial(
        gateway: &GraphGateway,
        diff: &Diff,
        warnings: &mut Vec<String>,
    ) -> Self {
        let mut subview = Self::default();
        for path in diff.paths() {
            match gateway
                .neighbors(&NodeId::file(path), &INITIAL_EDGE_KINDS, 1)
                .await
            {
                Ok(hood) => subview.merge(hood),
                Err(e) => {
                    let w = format!("neighborhood unavailable for {path}: {e}");
                    if !warnings.contains(&w) {
                        warnings.push(w);
                    }
                }
            }
        }
        debug!(
            "phase2: initial subview nodes={} edges={}",
            subview.nodes.len(),
            subview.edges.len()
        );
        subview
    }

    /// Merge an expansion result into the working set.
    pub fn merge(&mut self, hood: Neighborhood) {
        for node in hood.nodes {
            self.nodes.entry(node.id.clone()).or_insert(node);
        }
        for edge in hood.edges {
            let key = (edge.src.clone(), edge.dst.clone(), edge.kind);
            if self.edge_seen.insert(key) {
                self.edges.push(edge);
            }
        }
    }

    /// Insert a single node (incident search hits).
    pub fn insert_node(&mut self, node: GraphNode) {
        self.nodes.entry(node.id.clone()).or_insert(node);
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Strongest edge weight touching `id`; the gateway-reported signal
    /// strength behind an evidence citation.
    pub fn signal_strength(&self, id: &NodeId) -> Option<f32> {
        self.edges
            .iter()
            .filter(|e| &e.src == id || &e.dst == id)
            .map(|e| e.weight)
            .fold(None, |acc, w| Some(acc.map_or(w, |a: f32| a.max(w))))
    }

    /// Dominant relation of `id` within the subview, used to pick an
    /// evidence kind for file nodes.
    pub fn dominant_edge_kind(&self, id: &NodeId) -> Option<EdgeKind> {
        let priorities = [
            EdgeKind::CausedBy,
            EdgeKind::CoChanged,
            EdgeKind::AuthoredBy,
            EdgeKind::Imports,
            EdgeKind::Calls,
        ];
        priorities.into_iter().find(|k| {
            self.edges
                .iter()
                .any(|e| e.kind == *k && (&e.src == id || &e.dst == id))
        })
    }

    /// Render node lists with small human-readable labels — never raw
    /// code. Capped so a dense neighborhood cannot blow the prompt up.
    pub fn render(&self) -> String {
        let mut out = String::from("Nodes:\n");
        for node in self.nodes.values().take(RENDER_NODE_CAP) {
            let _ = writeln!(out, "- {} ({}) {}", node.id, kind_str(node.kind), node.label);
        }
        if self.nodes.len() > RENDER_NODE_CAP {
            let _ = writeln!(out, "- … {} more nodes elided", self.nodes.len() - RENDER_NODE_CAP);
        }
        out.push_str("Edges:\n");
        for edge in self.edges.iter().take(RENDER_EDGE_CAP) {
            if edge.weight < 1.0 {
                let _ = writeln!(
                    out,
                    "- {} -[{} {:.2}]-> {}",
                    edge.src,
                    edge_str(edge.kind),
                    edge.weight,
                    edge.dst
                );
            } else {
                let _ = writeln!(out, "- {} -[{}]-> {}", edge.src, edge_str(edge.kind), edge.dst);
            }
        }
        if self.edges.len() > RENDER_EDGE_CAP {
            let _ = writeln!(out, "- … {} more edges elided", self.edges.len() - RENDER_EDGE_CAP);
        }
        out
    }
}

/// An expansion the planner may request, as a closed enumeration — free
/// text never reaches the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionRequest {
    Imports(NodeId),
    CoChange(NodeId),
    Ownership(NodeId),
    Incidents(NodeId),
}

impl ExpansionRequest {
    /// Parse an `EXPAND:` operation word plus node id.
    pub fn parse(op: &str, id: &str) -> Option<Self> {
        let node = NodeId(id.to_string());
        match op.to_ascii_lowercase().as_str() {
            "imports" => Some(Self::Imports(node)),
            "cochange" | "co_change" => Some(Self::CoChange(node)),
            "ownership" => Some(Self::Ownership(node)),
            "incidents" => Some(Self::Incidents(node)),
            _ => None,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Imports(n) | Self::CoChange(n) | Self::Ownership(n) | Self::Incidents(n) => n,
        }
    }

    fn edge_kind(&self) -> EdgeKind {
        match self {
            Self::Imports(_) => EdgeKind::Imports,
            Self::CoChange(_) => EdgeKind::CoChanged,
            Self::Ownership(_) => EdgeKind::AuthoredBy,
            Self::Incidents(_) => EdgeKind::CausedBy,
        }
    }

    /// Fetch this expansion through the gateway.
    pub async fn fetch(
        &self,
        gateway: &GraphGateway,
    ) -> Result<Neighborhood, graph_gateway::GatewayError> {
        gateway.neighbors(self.node_id(), &[self.edge_kind()], 1).await
    }
}

/// Keep only requests naming nodes already shown, capped at `limit`.
pub fn validate_requests(
    raw: &[(String, String)],
    subview: &GraphSubview,
    limit: usize,
) -> Vec<ExpansionRequest> {
    let mut out = Vec::new();
    for (op, id) in raw {
        if out.len() >= limit {
            break;
        }
        let Some(req) = ExpansionRequest::parse(op, id) else {
            debug!("phase2: dropping unknown expansion op {op:?}");
            continue;
        };
        if !subview.contains(req.node_id()) {
            debug!("phase2: dropping expansion for unknown node {}", req.node_id());
            continue;
        }
        out.push(req);
    }
    out
}

fn kind_str(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::File => "file",
        NodeKind::Function => "function",
        NodeKind::Developer => "developer",
        NodeKind::Commit => "commit",
        NodeKind::Incident => "incident",
    }
}

fn edge_str(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Imports => "imports",
        EdgeKind::Calls => "calls",
        EdgeKind::CoChanged => "co_changed",
        EdgeKind::AuthoredBy => "authored_by",
        EdgeKind::CausedBy => "caused_by",
    }
}
