//! In-memory graph snapshot loaded from the ingester export.
//!
//! The ingester writes three files into the data directory:
//! - `manifest.json` — `{schema_version, head_commit, generated_at}`
//! - `nodes.jsonl`   — one [`GraphNode`] per line
//! - `edges.jsonl`   — one [`GraphEdge`] per line
//!
//! The snapshot is loaded once at gateway open and shared read-only for
//! the process lifetime. Queries are pure in-memory lookups; bounds
//! (depth, degree cap) are enforced here so no caller can walk the whole
//! graph by accident.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{GatewayConfig, SUPPORTED_SCHEMA_VERSION};
use crate::errors::{GatewayError, GatewayResult};
use crate::types::{
    CoChangePair, EdgeKind, GraphEdge, GraphNode, Neighborhood, NodeId, OwnershipShare,
};

/// Snapshot manifest written by the ingester.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub head_commit: String,
    #[serde(default)]
    pub generated_at: Option<String>,
}

/// Loaded snapshot with adjacency indexes.
#[derive(Debug)]
pub struct SnapshotStore {
    manifest: Manifest,
    nodes: HashMap<NodeId, GraphNode>,
    edges: Vec<GraphEdge>,
    out: HashMap<NodeId, Vec<usize>>,
    inn: HashMap<NodeId, Vec<usize>>,
}

impl SnapshotStore {
    /// Load the snapshot under `cfg.data_dir`.
    ///
    /// Returns `Ok(None)` when no manifest exists (graph store absent →
    /// queries degrade). An unknown schema version is fatal.
    pub fn load(cfg: &GatewayConfig) -> GatewayResult<Option<Self>> {
        let manifest_path = cfg.manifest_path();
        if !manifest_path.exists() {
            debug!("snapshot: no manifest at {}", manifest_path.display());
            return Ok(None);
        }

        let raw = fs::read_to_string(&manifest_path)
            .map_err(|e| GatewayError::CorruptSnapshot(format!("manifest read: {e}")))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .map_err(|e| GatewayError::CorruptSnapshot(format!("manifest decode: {e}")))?;

        if manifest.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(GatewayError::SchemaMismatch {
                found: manifest.schema_version,
                supported: SUPPORTED_SCHEMA_VERSION,
            });
        }

        let nodes = read_jsonl::<GraphNode>(&cfg.nodes_path())?;
        let edges = read_jsonl::<GraphEdge>(&cfg.edges_path())?;

        let mut node_map = HashMap::with_capacity(nodes.len());
        for n in nodes {
            node_map.insert(n.id.clone(), n);
        }

        let mut out: HashMap<NodeId, Vec<usize>> = HashMap::new();
        let mut inn: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (idx, e) in edges.iter().enumerate() {
            out.entry(e.src.clone()).or_default().push(idx);
            inn.entry(e.dst.clone()).or_default().push(idx);
        }

        info!(
            head = %manifest.head_commit,
            nodes = node_map.len(),
            edges = edges.len(),
            "snapshot loaded"
        );

        Ok(Some(Self {
            manifest,
            nodes: node_map,
            edges,
            out,
            inn,
        }))
    }

    pub fn head_commit(&self) -> &str {
        &self.manifest.head_commit
    }

    pub fn schema_version(&self) -> u32 {
        self.manifest.schema_version
    }

    pub fn resolve(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Breadth-first neighborhood of `start`, following the given edge
    /// kinds in both directions, bounded by `depth` and `cap` nodes.
    pub fn neighbors(
        &self,
        start: &NodeId,
        kinds: &[EdgeKind],
        depth: usize,
        cap: usize,
    ) -> Neighborhood {
        let mut result = Neighborhood::default();
        let Some(origin) = self.nodes.get(start) else {
            return result;
        };

        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut edge_seen: HashSet<usize> = HashSet::new();
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
        seen.insert(start.clone());
        result.nodes.push(origin.clone());
        queue.push_back((start.clone(), 0));

        while let Some((id, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for &edge_idx in self
                .out
                .get(&id)
                .into_iter()
                .chain(self.inn.get(&id))
                .flatten()
            {
                let edge = &self.edges[edge_idx];
                if !kinds.contains(&edge.kind) {
                    continue;
                }
                let other = if edge.src == id { &edge.dst } else { &edge.src };
                if edge_seen.insert(edge_idx) {
                    result.edges.push(edge.clone());
                }
                if seen.contains(other) {
                    continue;
                }
                if result.nodes.len() >= cap {
                    result.truncated = true;
                    continue;
                }
                if let Some(node) = self.nodes.get(other) {
                    seen.insert(other.clone());
                    result.nodes.push(node.clone());
                    queue.push_back((other.clone(), dist + 1));
                }
            }
        }

        result
    }

    /// Co-change partners of `path` with frequency ≥ `min_freq`, ordered
    /// by frequency descending. Co-change is symmetric; partners reached
    /// from either edge direction are merged by max frequency.
    pub fn co_changed(&self, path: &str, min_freq: f32) -> Vec<CoChangePair> {
        let id = NodeId::file(path);
        let mut best: HashMap<&NodeId, f32> = HashMap::new();

        for &edge_idx in self
            .out
            .get(&id)
            .into_iter()
            .chain(self.inn.get(&id))
            .flatten()
        {
            let edge = &self.edges[edge_idx];
            if edge.kind != EdgeKind::CoChanged {
                continue;
            }
            let other = if edge.src == id { &edge.dst } else { &edge.src };
            let slot = best.entry(other).or_insert(0.0);
            if edge.weight > *slot {
                *slot = edge.weight;
            }
        }

        let mut pairs: Vec<CoChangePair> = best
            .into_iter()
            .filter(|(_, f)| *f >= min_freq)
            .map(|(id, frequency)| CoChangePair {
                path: id.key().to_string(),
                frequency,
            })
            .collect();
        pairs.sort_by(|a, b| {
            b.frequency
                .partial_cmp(&a.frequency)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pairs
    }

    /// Ownership shares of `path` from `AuthoredBy` edges.
    pub fn ownership(&self, path: &str) -> Vec<OwnershipShare> {
        let id = NodeId::file(path);
        let mut shares: Vec<OwnershipShare> = self
            .out
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|&idx| {
                let edge = &self.edges[idx];
                (edge.kind == EdgeKind::AuthoredBy).then(|| OwnershipShare {
                    developer: edge.dst.key().to_string(),
                    commit_share: edge.weight,
                    last_touched: edge.last_touched.clone(),
                })
            })
            .collect();
        shares.sort_by(|a, b| {
            b.commit_share
                .partial_cmp(&a.commit_share)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        shares
    }

    /// Number of files importing `path` (in-degree over `Imports`).
    pub fn importer_count(&self, path: &str) -> usize {
        let id = NodeId::file(path);
        self.inn
            .get(&id)
            .map(|idxs| {
                idxs.iter()
                    .filter(|&&i| self.edges[i].kind == EdgeKind::Imports)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Whether the file is present in the graph at all.
    pub fn knows_file(&self, path: &str) -> bool {
        self.nodes.contains_key(&NodeId::file(path))
    }
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> GatewayResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path)
        .map_err(|e| GatewayError::CorruptSnapshot(format!("{}: {e}", path.display())))?;
    let mut out = Vec::new();
    for (no, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .map_err(|e| GatewayError::CorruptSnapshot(format!("{}: {e}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: T = serde_json::from_str(&line).map_err(|e| {
            GatewayError::CorruptSnapshot(format!("{} line {}: {e}", path.display(), no + 1))
        })?;
        out.push(row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &Path) {
        let manifest = r#"{"schema_version":1,"head_commit":"deadbeef"}"#;
        fs::write(dir.join("manifest.json"), manifest).unwrap();

        let mut nodes = fs::File::create(dir.join("nodes.jsonl")).unwrap();
        for (id, kind, label) in [
            ("file:a.rs", "file", "a.rs"),
            ("file:b.rs", "file", "b.rs"),
            ("file:c.rs", "file", "c.rs"),
            ("dev:alice", "developer", "alice"),
        ] {
            writeln!(
                nodes,
                r#"{{"id":"{id}","kind":"{kind}","label":"{label}"}}"#
            )
            .unwrap();
        }

        let mut edges = fs::File::create(dir.join("edges.jsonl")).unwrap();
        for line in [
            r#"{"src":"file:b.rs","dst":"file:a.rs","kind":"imports","weight":1.0}"#,
            r#"{"src":"file:c.rs","dst":"file:a.rs","kind":"imports","weight":1.0}"#,
            r#"{"src":"file:a.rs","dst":"file:b.rs","kind":"co_changed","weight":0.7}"#,
            r#"{"src":"file:a.rs","dst":"dev:alice","kind":"authored_by","weight":0.9}"#,
        ] {
            writeln!(edges, "{line}").unwrap();
        }
    }

    fn load_fixture() -> (tempfile::TempDir, SnapshotStore) {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let cfg = GatewayConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let store = SnapshotStore::load(&cfg).unwrap().unwrap();
        (dir, store)
    }

    #[test]
    fn load_reads_manifest_and_counts() {
        let (_dir, store) = load_fixture();
        assert_eq!(store.head_commit(), "deadbeef");
        assert_eq!(store.importer_count("a.rs"), 2);
        assert!(store.knows_file("b.rs"));
        assert!(!store.knows_file("nope.rs"));
    }

    #[test]
    fn unknown_schema_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            r#"{"schema_version":99,"head_commit":"x"}"#,
        )
        .unwrap();
        let cfg = GatewayConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        match SnapshotStore::load(&cfg) {
            Err(GatewayError::SchemaMismatch { found, .. }) => assert_eq!(found, 99),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_manifest_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GatewayConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(SnapshotStore::load(&cfg).unwrap().is_none());
    }

    #[test]
    fn co_changed_filters_and_orders() {
        let (_dir, store) = load_fixture();
        let pairs = store.co_changed("a.rs", 0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].path, "b.rs");
        assert!(store.co_changed("a.rs", 0.8).is_empty());
    }

    #[test]
    fn neighbors_respects_cap_and_depth() {
        let (_dir, store) = load_fixture();
        let all = store.neighbors(
            &NodeId::file("a.rs"),
            &[EdgeKind::Imports, EdgeKind::CoChanged, EdgeKind::AuthoredBy],
            1,
            200,
        );
        // a.rs plus b.rs, c.rs, alice.
        assert_eq!(all.nodes.len(), 4);
        assert!(!all.truncated);

        let capped = store.neighbors(
            &NodeId::file("a.rs"),
            &[EdgeKind::Imports, EdgeKind::CoChanged, EdgeKind::AuthoredBy],
            1,
            2,
        );
        assert_eq!(capped.nodes.len(), 2);
        assert!(capped.truncated);
    }
}
