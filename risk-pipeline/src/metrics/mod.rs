//! Phase-1 metrics engine.
//!
//! Computes per-file baseline metrics through the gateway and aggregates
//! them to an initial tier. Per-file work runs concurrently; the
//! gateway's read semaphore bounds actual storage parallelism. Fully
//! available results are memoized through the coalescing metric cache
//! keyed by `(path, HEAD, algo version)`; degraded results are served but
//! never cached, so a recovered store heals later runs.
//!
//! Unavailable signals clamp to neutral priors — "signal absent" never
//! becomes "signal zero" silently: each clamp is counted on the file row
//! and folded into the assessment's confidence.

pub mod scoring;

use futures::future::join_all;
use tracing::debug;

use git_diff_engine::Diff;
use graph_gateway::{GraphGateway, MetricCache, MetricKey};

use crate::classify::patterns;
use crate::config::{METRIC_ALGO_VERSION, Phase1Config};
use crate::model::{BaselineMetrics, Phase1Output};

/// Confidence penalty cap from degraded files.
const MAX_CONFIDENCE_PENALTY: f32 = 0.3;

/// Compute Phase-1 metrics for the diff.
///
/// `minimal` restricts the scan to coupling + incidents (the cheap
/// fast-path for diffs that skip Phase 2); minimal results bypass the
/// cache since they are not comparable to full rows.
pub async fn compute(
    diff: &Diff,
    gateway: &GraphGateway,
    cache: &MetricCache<BaselineMetrics>,
    cfg: &Phase1Config,
    minimal: bool,
) -> Phase1Output {
    let test_ratio = diff_test_ratio(diff);
    let head = gateway.head_commit().unwrap_or("unknown").to_string();

    let tasks = diff
        .files
        .iter()
        .filter(|f| !f.binary)
        .map(|f| {
            let path = f.path.clone();
            let head = head.clone();
            async move {
                if minimal {
                    return compute_one(gateway, cfg, &path, test_ratio, true).await;
                }
                let key = MetricKey {
                    path: path.clone(),
                    head_commit: head,
                    algo_version: METRIC_ALGO_VERSION,
                };
                let res = cache
                    .get_or_try_compute(key, || async {
                        let (m, warns) = compute_one(gateway, cfg, &path, test_ratio, false).await;
                        if m.unavailable_signals == 0 {
                            Ok(m)
                        } else {
                            Err((m, warns))
                        }
                    })
                    .await;
                match res {
                    Ok(m) => (m, Vec::new()),
                    Err((m, warns)) => (m, warns),
                }
            }
        })
        .collect::<Vec<_>>();

    let rows = join_all(tasks).await;

    let mut per_file = Vec::with_capacity(rows.len());
    let mut warnings: Vec<String> = Vec::new();
    for (m, warns) in rows {
        for w in warns {
            if !warnings.contains(&w) {
                warnings.push(w);
            }
        }
        per_file.push(m);
    }

    let max_score = per_file.iter().map(|m| m.file_score).fold(0.0_f32, f32::max);
    let tier = scoring::tier_for_score(cfg, max_score);

    let degraded = per_file.iter().filter(|m| m.unavailable_signals >= 2).count();
    // The minimal scan is advisory (fast-path citations only); clamped
    // signals there must not dent the assessment's confidence.
    let confidence_penalty = if minimal || per_file.is_empty() {
        0.0
    } else {
        (MAX_CONFIDENCE_PENALTY * degraded as f32 / per_file.len() as f32)
            .min(MAX_CONFIDENCE_PENALTY)
    };

    debug!(
        "phase1: files={} max_score={:.3} tier={} degraded={} minimal={}",
        per_file.len(),
        max_score,
        tier,
        degraded,
        minimal
    );

    Phase1Output {
        per_file,
        tier,
        max_score,
        confidence_penalty,
        warnings,
    }
}

/// Diff-wide fraction of changed lines living in test files.
fn diff_test_ratio(diff: &Diff) -> f32 {
    let mut test_lines = 0u32;
    let mut total = 0u32;
    for f in &diff.files {
        let lines = f.added_lines + f.removed_lines;
        total += lines;
        if patterns::is_test_path(&f.path) {
            test_lines += lines;
        }
    }
    if total == 0 {
        scoring::NEUTRAL_TEST_RATIO
    } else {
        test_lines as f32 / total as f32
    }
}

/// Compute one file's row. Returns the row plus warnings for clamped
/// signals; a row with `unavailable_signals == 0` never carries warnings.
async fn compute_one(
    gateway: &GraphGateway,
    cfg: &Phase1Config,
    path: &str,
    test_ratio: f32,
    minimal: bool,
) -> (BaselineMetrics, Vec<String>) {
    let mut warnings = Vec::new();
    let mut unavailable = 0u8;

    let snapshot_present = gateway.head_commit().is_some();
    let new_file = snapshot_present && !gateway.knows_file(path);
    if new_file {
        warnings.push(format!("{path}: not in graph (new file); signals clamped"));
    }

    // Coupling.
    let coupling_score = if new_file {
        unavailable += 1;
        0.0
    } else {
        match gateway.importer_count(path).await {
            Ok(n) => scoring::coupling_score(n, cfg.coupling_saturation),
            Err(e) => {
                unavailable += 1;
                push_once(&mut warnings, format!("coupling unavailable: {e}"));
                0.0
            }
        }
    };

    // Co-change.
    let (co_change_frequency, top_co_change_partner) = if minimal {
        (0.0, None)
    } else if new_file {
        unavailable += 1;
        (0.0, None)
    } else {
        match gateway.co_changed(path, cfg.co_change_floor).await {
            Ok(pairs) => match pairs.first() {
                Some(top) => (top.frequency, Some(top.path.clone())),
                None => (0.0, None),
            },
            Err(e) => {
                unavailable += 1;
                push_once(&mut warnings, format!("co-change unavailable: {e}"));
                (0.0, None)
            }
        }
    };

    // Ownership churn.
    let ownership_churn = if minimal {
        scoring::NEUTRAL_OWNERSHIP_CHURN
    } else if new_file {
        unavailable += 1;
        scoring::NEUTRAL_OWNERSHIP_CHURN
    } else {
        match gateway.ownership(path).await {
            Ok(shares) if !shares.is_empty() => {
                let raw: Vec<f32> = shares.iter().map(|s| s.commit_share).collect();
                scoring::ownership_churn(&raw)
            }
            Ok(_) => {
                unavailable += 1;
                scoring::NEUTRAL_OWNERSHIP_CHURN
            }
            Err(e) => {
                unavailable += 1;
                push_once(&mut warnings, format!("ownership unavailable: {e}"));
                scoring::NEUTRAL_OWNERSHIP_CHURN
            }
        }
    };

    // Incidents.
    let (incident_count, incident_score) = if new_file {
        unavailable += 1;
        (0, 0.0)
    } else {
        match gateway.incidents(path).await {
            Ok(summary) => (summary.count, scoring::incident_score(summary.count)),
            Err(e) => {
                unavailable += 1;
                push_once(&mut warnings, format!("incidents unavailable: {e}"));
                (0, 0.0)
            }
        }
    };

    let mut m = BaselineMetrics {
        path: path.to_string(),
        coupling_score,
        co_change_frequency,
        top_co_change_partner,
        ownership_churn,
        test_ratio,
        incident_count,
        incident_score,
        unavailable_signals: unavailable,
        file_score: 0.0,
    };
    m.file_score = scoring::file_score(cfg, &m);
    (m, warnings)
}

fn push_once(warnings: &mut Vec<String>, w: String) {
    if !warnings.contains(&w) {
        warnings.push(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;
    use git_diff_engine::{ChangeType, FileChange, Language};
    use graph_gateway::GatewayConfig;
    use std::io::Write;

    fn change(path: &str, added: u32) -> FileChange {
        FileChange {
            path: path.into(),
            change_type: ChangeType::Modify,
            added_lines: added,
            removed_lines: 0,
            hunks: vec![],
            language: Language::from_path(path),
            binary: false,
        }
    }

    fn diff_of(files: Vec<FileChange>) -> Diff {
        Diff {
            head_commit: "head".into(),
            base_ref: "HEAD".into(),
            files,
        }
    }

    /// Snapshot where hot.rs has 12 importers and a 0.87 co-change edge.
    fn hot_gateway() -> (tempfile::TempDir, GraphGateway) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"schema_version":1,"head_commit":"h1"}"#,
        )
        .unwrap();

        let mut nodes = std::fs::File::create(dir.path().join("nodes.jsonl")).unwrap();
        writeln!(nodes, r#"{{"id":"file:hot.rs","kind":"file","label":"hot.rs"}}"#).unwrap();
        writeln!(nodes, r#"{{"id":"file:pair.rs","kind":"file","label":"pair.rs"}}"#).unwrap();
        writeln!(nodes, r#"{{"id":"dev:a","kind":"developer","label":"a"}}"#).unwrap();
        writeln!(nodes, r#"{{"id":"dev:b","kind":"developer","label":"b"}}"#).unwrap();
        for i in 0..12 {
            writeln!(
                nodes,
                r#"{{"id":"file:dep{i}.rs","kind":"file","label":"dep{i}.rs"}}"#
            )
            .unwrap();
        }

        let mut edges = std::fs::File::create(dir.path().join("edges.jsonl")).unwrap();
        for i in 0..12 {
            writeln!(
                edges,
                r#"{{"src":"file:dep{i}.rs","dst":"file:hot.rs","kind":"imports"}}"#
            )
            .unwrap();
        }
        writeln!(
            edges,
            r#"{{"src":"file:hot.rs","dst":"file:pair.rs","kind":"co_changed","weight":0.87}}"#
        )
        .unwrap();
        writeln!(
            edges,
            r#"{{"src":"file:hot.rs","dst":"dev:a","kind":"authored_by","weight":0.5}}"#
        )
        .unwrap();
        writeln!(
            edges,
            r#"{{"src":"file:hot.rs","dst":"dev:b","kind":"authored_by","weight":0.5}}"#
        )
        .unwrap();

        let gw = GraphGateway::open(GatewayConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        (dir, gw)
    }

    #[tokio::test]
    async fn hot_file_scores_high() {
        let (_dir, gw) = hot_gateway();
        let cache = MetricCache::new();
        let diff = diff_of(vec![change("hot.rs", 40)]);

        let out = compute(&diff, &gw, &cache, &Phase1Config::default(), false).await;
        assert_eq!(out.per_file.len(), 1);
        let m = &out.per_file[0];
        assert_eq!(m.coupling_score, 1.0);
        assert!((m.co_change_frequency - 0.87).abs() < 1e-6);
        assert_eq!(m.top_co_change_partner.as_deref(), Some("pair.rs"));
        assert!(m.ownership_churn > 0.4);
        // incidents store absent → clamped, counted unavailable
        assert_eq!(m.unavailable_signals, 1);
        assert!(out.tier >= Tier::Medium);
    }

    #[tokio::test]
    async fn new_file_clamps_all_graph_signals() {
        let (_dir, gw) = hot_gateway();
        let cache = MetricCache::new();
        let diff = diff_of(vec![change("brand_new.rs", 10)]);

        let out = compute(&diff, &gw, &cache, &Phase1Config::default(), false).await;
        let m = &out.per_file[0];
        assert_eq!(m.unavailable_signals, 4);
        assert_eq!(m.coupling_score, 0.0);
        assert!((m.ownership_churn - scoring::NEUTRAL_OWNERSHIP_CHURN).abs() < 1e-6);
        assert!(out.confidence_penalty > 0.0);
    }

    #[tokio::test]
    async fn test_ratio_is_diff_wide() {
        let diff = diff_of(vec![change("src/a.rs", 30), change("tests/a_test.rs", 10)]);
        let ratio = diff_test_ratio(&diff);
        assert!((ratio - 0.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn degraded_rows_are_not_cached() {
        let (_dir, gw) = hot_gateway();
        let cache = MetricCache::new();
        // incidents store missing → every row has ≥1 unavailable signal,
        // so nothing lands in the cache.
        let diff = diff_of(vec![change("hot.rs", 5)]);
        let _ = compute(&diff, &gw, &cache, &Phase1Config::default(), false).await;
        assert_eq!(cache.len().await, 1); // key reserved but cell left empty
        let again = compute(&diff, &gw, &cache, &Phase1Config::default(), false).await;
        assert_eq!(again.per_file[0].unavailable_signals, 1);
    }
}
