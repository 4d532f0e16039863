//! Typed, bounded reads over the repository knowledge graph.
//!
//! [`GraphGateway`] is the only component that talks to storage. It fronts
//! three stores:
//!
//! 1. the **graph snapshot** exported by the ingester (in-memory after
//!    open),
//! 2. the **relational store** (SQLite) holding incident history,
//! 3. the in-process coalescing **metric cache**.
//!
//! Every query runs under a read semaphore and a per-query timeout. A
//! store that cannot answer yields [`GatewayError::Unavailable`] — the
//! caller clamps that signal to its neutral prior; it never fails the
//! assessment. The single fatal open-time error is a snapshot schema this
//! build does not understand.
//!
//! The gateway is handed to the pipeline as a capability: the pipeline
//! borrows it, never owns it, and stays agnostic of the storage layout.

pub mod config;
pub mod errors;
pub mod incidents;
pub mod metric_cache;
pub mod search;
pub mod snapshot;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub use config::GatewayConfig;
pub use errors::{GatewayError, GatewayResult, StoreKind};
pub use metric_cache::{MetricCache, MetricKey};
pub use types::{
    CoChangePair, EdgeKind, GraphEdge, GraphNode, IncidentHit, IncidentSummary, Neighborhood,
    NodeId, NodeKind, OwnershipShare,
};

use incidents::IncidentStore;
use snapshot::SnapshotStore;

/// Maximum expansion depth accepted by [`GraphGateway::neighbors`].
pub const MAX_DEPTH: usize = 3;

/// Facade over the three backing stores.
pub struct GraphGateway {
    cfg: GatewayConfig,
    snapshot: Option<SnapshotStore>,
    incident_store: Option<IncidentStore>,
    read_sem: Arc<Semaphore>,
}

impl GraphGateway {
    /// Open the gateway over `cfg.data_dir`.
    ///
    /// A missing snapshot or incident database is not an error — the
    /// corresponding queries degrade to `Unavailable`. A snapshot whose
    /// schema version is unknown refuses to open.
    ///
    /// # Errors
    /// [`GatewayError::SchemaMismatch`] / [`GatewayError::CorruptSnapshot`].
    pub fn open(cfg: GatewayConfig) -> GatewayResult<Self> {
        let snapshot = SnapshotStore::load(&cfg)?;
        if snapshot.is_none() {
            warn!(
                "graph snapshot absent under {} — graph queries will degrade",
                cfg.data_dir.display()
            );
        }
        let incident_store = IncidentStore::open(&cfg.incidents_db_path());
        if incident_store.is_none() {
            warn!(
                "incident store absent under {} — incident queries will degrade",
                cfg.data_dir.display()
            );
        }

        let read_sem = Arc::new(Semaphore::new(cfg.read_concurrency));
        Ok(Self {
            cfg,
            snapshot,
            incident_store,
            read_sem,
        })
    }

    /// HEAD commit id the snapshot was taken at, when a snapshot exists.
    pub fn head_commit(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.head_commit())
    }

    /// Snapshot schema version, when a snapshot exists.
    pub fn schema_version(&self) -> Option<u32> {
        self.snapshot.as_ref().map(|s| s.schema_version())
    }

    /// Cheap synchronous membership probe used to tell "new file" apart
    /// from "known file with no edges".
    pub fn knows_file(&self, path: &str) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.knows_file(path))
    }

    /// Bounded neighborhood expansion (depth clamped to [`MAX_DEPTH`],
    /// degree-capped per config).
    pub async fn neighbors(
        &self,
        node: &NodeId,
        edge_kinds: &[EdgeKind],
        depth: usize,
    ) -> GatewayResult<Neighborhood> {
        let snap = self.require_snapshot()?;
        let depth = depth.min(MAX_DEPTH);
        let cap = self.cfg.degree_cap;
        let node = node.clone();
        let kinds = edge_kinds.to_vec();
        self.bounded(StoreKind::Graph, move || {
            snap.neighbors(&node, &kinds, depth, cap)
        })
        .await
    }

    /// Co-change partners of `path` with frequency ≥ `min_freq`, ordered
    /// by frequency descending.
    pub async fn co_changed(
        &self,
        path: &str,
        min_freq: f32,
    ) -> GatewayResult<Vec<CoChangePair>> {
        let snap = self.require_snapshot()?;
        let path = path.to_string();
        self.bounded(StoreKind::Graph, move || snap.co_changed(&path, min_freq))
            .await
    }

    /// Ownership shares of `path`, largest first.
    pub async fn ownership(&self, path: &str) -> GatewayResult<Vec<OwnershipShare>> {
        let snap = self.require_snapshot()?;
        let path = path.to_string();
        self.bounded(StoreKind::Graph, move || snap.ownership(&path)).await
    }

    /// In-degree of `path` over `Imports` edges (files importing it).
    pub async fn importer_count(&self, path: &str) -> GatewayResult<usize> {
        let snap = self.require_snapshot()?;
        let path = path.to_string();
        self.bounded(StoreKind::Graph, move || snap.importer_count(&path))
            .await
    }

    /// Incident aggregate for `path` within the configured window.
    pub async fn incidents(&self, path: &str) -> GatewayResult<IncidentSummary> {
        let store = self.require_incidents()?;
        let path = path.to_string();
        let window = self.cfg.incident_window_days;
        self.bounded_blocking(StoreKind::Relational, move || {
            store.summary_for(&path, window)
        })
        .await
    }

    /// Ranked incident search: lexical overlap fused with cosine
    /// similarity when `query_embedding` is supplied.
    pub async fn search_incidents(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        k: usize,
    ) -> GatewayResult<Vec<IncidentHit>> {
        let store = self.require_incidents()?;
        let window = self.cfg.incident_window_days;
        let rows = self
            .bounded_blocking(StoreKind::Relational, move || {
                store.rows_for_search(window)
            })
            .await?;

        let mut hits: Vec<IncidentHit> = rows
            .into_iter()
            .map(|row| {
                let text = search::keyword_score(query, &row.title);
                let vec = match (query_embedding, row.embedding.as_deref()) {
                    (Some(q), Some(e)) => Some(search::cosine(q, e)),
                    _ => None,
                };
                IncidentHit {
                    node_id: NodeId(format!("incident:{}", row.id)),
                    title: row.title,
                    severity: row.severity,
                    score: search::fuse(text, vec),
                }
            })
            .filter(|h| h.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Resolve a node id to its stored record. Citation grounding: every
    /// evidence item in an assessment must resolve through here.
    pub async fn resolve_node(&self, id: &NodeId) -> GatewayResult<Option<GraphNode>> {
        // Incident nodes live in the relational store, not the snapshot.
        if let Some(num) = id.as_str().strip_prefix("incident:") {
            return Ok(self.resolve_incident(num).await);
        }
        let snap = self.require_snapshot()?;
        let id = id.clone();
        self.bounded(StoreKind::Graph, move || snap.resolve(&id).cloned())
            .await
    }

    async fn resolve_incident(&self, num: &str) -> Option<GraphNode> {
        let store = self.incident_store.clone()?;
        let id: i64 = num.parse().ok()?;
        let window = self.cfg.incident_window_days;
        let row = tokio::task::spawn_blocking(move || {
            store
                .rows_for_search(window)
                .ok()
                .and_then(|rows| rows.into_iter().find(|r| r.id == id))
        })
        .await
        .ok()??;
        Some(GraphNode {
            id: NodeId(format!("incident:{}", row.id)),
            kind: NodeKind::Incident,
            label: row.title,
        })
    }

    /* --------------------- Internals --------------------- */

    fn require_snapshot(&self) -> GatewayResult<&SnapshotStore> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| GatewayError::unavailable(StoreKind::Graph, "snapshot absent"))
    }

    fn require_incidents(&self) -> GatewayResult<IncidentStore> {
        self.incident_store
            .clone()
            .ok_or_else(|| GatewayError::unavailable(StoreKind::Relational, "incidents.db absent"))
    }

    /// Run a pure in-memory read under the semaphore + timeout contract.
    async fn bounded<T, F>(&self, store: StoreKind, f: F) -> GatewayResult<T>
    where
        F: FnOnce() -> T,
    {
        let _permit = self
            .read_sem
            .acquire()
            .await
            .map_err(|_| GatewayError::unavailable(store, "gateway shutting down"))?;
        // In-memory reads cannot block; the timeout contract is satisfied
        // trivially, so no timer is armed here.
        Ok(f())
    }

    /// Run a blocking-store read on the blocking pool, bounded by the
    /// per-query timeout.
    async fn bounded_blocking<T, F>(&self, store: StoreKind, f: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> rusqlite::Result<T> + Send + 'static,
    {
        let _permit = self
            .read_sem
            .acquire()
            .await
            .map_err(|_| GatewayError::unavailable(store, "gateway shutting down"))?;

        let timeout = Duration::from_millis(self.cfg.query_timeout_ms);
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(timeout, task).await {
            Err(_) => {
                debug!("gateway: {store:?} query timed out after {timeout:?}");
                Err(GatewayError::unavailable(store, "query timeout"))
            }
            Ok(Err(join)) => Err(GatewayError::unavailable(store, format!("task failed: {join}"))),
            Ok(Ok(Err(sql))) => Err(GatewayError::unavailable(store, sql.to_string())),
            Ok(Ok(Ok(v))) => Ok(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"schema_version":1,"head_commit":"cafe01"}"#,
        )
        .unwrap();

        let mut nodes = std::fs::File::create(dir.path().join("nodes.jsonl")).unwrap();
        for line in [
            r#"{"id":"file:core.rs","kind":"file","label":"core.rs"}"#,
            r#"{"id":"file:user.rs","kind":"file","label":"user.rs"}"#,
            r#"{"id":"dev:bob","kind":"developer","label":"bob"}"#,
        ] {
            writeln!(nodes, "{line}").unwrap();
        }
        let mut edges = std::fs::File::create(dir.path().join("edges.jsonl")).unwrap();
        for line in [
            r#"{"src":"file:user.rs","dst":"file:core.rs","kind":"imports"}"#,
            r#"{"src":"file:core.rs","dst":"dev:bob","kind":"authored_by","weight":1.0}"#,
        ] {
            writeln!(edges, "{line}").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn queries_answer_from_snapshot() {
        let dir = fixture_dir();
        let gateway = GraphGateway::open(GatewayConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(gateway.head_commit(), Some("cafe01"));
        assert_eq!(gateway.importer_count("core.rs").await.unwrap(), 1);

        let own = gateway.ownership("core.rs").await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].developer, "bob");

        let hood = gateway
            .neighbors(&NodeId::file("core.rs"), &[EdgeKind::Imports], 1)
            .await
            .unwrap();
        assert_eq!(hood.nodes.len(), 2);
    }

    #[tokio::test]
    async fn missing_stores_degrade_to_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = GraphGateway::open(GatewayConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        let err = gateway.co_changed("a.rs", 0.5).await.unwrap_err();
        assert!(err.is_degradable());
        let err = gateway.incidents("a.rs").await.unwrap_err();
        assert!(err.is_degradable());
        assert_eq!(gateway.head_commit(), None);
    }

    #[tokio::test]
    async fn resolve_node_grounds_snapshot_citations() {
        let dir = fixture_dir();
        let gateway = GraphGateway::open(GatewayConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        let node = gateway
            .resolve_node(&NodeId::file("core.rs"))
            .await
            .unwrap();
        assert!(node.is_some());
        let missing = gateway
            .resolve_node(&NodeId::file("ghost.rs"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
