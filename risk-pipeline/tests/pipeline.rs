//! End-to-end pipeline scenarios over a fixture graph snapshot, a seeded
//! incident store, and a replayed LLM.

use std::io::Write as _;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use git_diff_engine::{ChangeType, Diff, DiffHunk, DiffLine, FileChange, Language};
use graph_gateway::{GatewayConfig, GraphGateway, MetricCache};
use risk_pipeline::model::{AiMode, AssessOptions, ModificationType, TerminatedReason, Tier};
use risk_pipeline::{Budget, PipelineDeps, PlannerClient, ReplayClient, assess_diff};

/// Graph fixture: `src/hot.rs` has 12 importers, a 0.87 co-change edge to
/// `src/pair.rs`, two owners, and incident 1 caused by it. The incident
/// store carries two recent incidents for the file.
fn write_fixture(dir: &Path) {
    std::fs::write(
        dir.join("manifest.json"),
        r#"{"schema_version":1,"head_commit":"feedface01"}"#,
    )
    .unwrap();

    let mut nodes = std::fs::File::create(dir.join("nodes.jsonl")).unwrap();
    for line in [
        r#"{"id":"file:src/hot.rs","kind":"file","label":"src/hot.rs"}"#,
        r#"{"id":"file:src/pair.rs","kind":"file","label":"src/pair.rs"}"#,
        r#"{"id":"dev:alice","kind":"developer","label":"alice"}"#,
        r#"{"id":"dev:bob","kind":"developer","label":"bob"}"#,
        r#"{"id":"incident:1","kind":"incident","label":"checkout outage"}"#,
    ] {
        writeln!(nodes, "{line}").unwrap();
    }
    for i in 0..12 {
        writeln!(
            nodes,
            r#"{{"id":"file:src/dep{i}.rs","kind":"file","label":"src/dep{i}.rs"}}"#
        )
        .unwrap();
    }

    let mut edges = std::fs::File::create(dir.join("edges.jsonl")).unwrap();
    for i in 0..12 {
        writeln!(
            edges,
            r#"{{"src":"file:src/dep{i}.rs","dst":"file:src/hot.rs","kind":"imports"}}"#
        )
        .unwrap();
    }
    for line in [
        r#"{"src":"file:src/hot.rs","dst":"file:src/pair.rs","kind":"co_changed","weight":0.87}"#,
        r#"{"src":"file:src/hot.rs","dst":"dev:alice","kind":"authored_by","weight":0.5}"#,
        r#"{"src":"file:src/hot.rs","dst":"dev:bob","kind":"authored_by","weight":0.5}"#,
        r#"{"src":"incident:1","dst":"file:src/hot.rs","kind":"caused_by"}"#,
    ] {
        writeln!(edges, "{line}").unwrap();
    }

    let conn = Connection::open(dir.join("incidents.db")).unwrap();
    conn.execute_batch(
        "CREATE TABLE incidents (
            id INTEGER PRIMARY KEY,
            file_path TEXT NOT NULL,
            severity TEXT NOT NULL,
            title TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            embedding BLOB
        );",
    )
    .unwrap();
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    conn.execute(
        "INSERT INTO incidents (id, file_path, severity, title, occurred_at)
         VALUES (1, 'src/hot.rs', 'high', 'checkout outage', ?1)",
        [now.as_str()],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO incidents (id, file_path, severity, title, occurred_at)
         VALUES (2, 'src/hot.rs', 'medium', 'latency regression', ?1)",
        [now.as_str()],
    )
    .unwrap();
}

fn open_gateway(dir: &Path) -> GraphGateway {
    GraphGateway::open(GatewayConfig {
        data_dir: dir.to_path_buf(),
        ..Default::default()
    })
    .unwrap()
}

fn change(path: &str, added: &[&str]) -> FileChange {
    let lines = added
        .iter()
        .enumerate()
        .map(|(i, l)| DiffLine::Added {
            new_line: (i + 1) as u32,
            content: l.to_string(),
        })
        .collect::<Vec<_>>();
    FileChange {
        path: path.to_string(),
        change_type: ChangeType::Modify,
        added_lines: added.len() as u32,
        removed_lines: 0,
        hunks: vec![DiffHunk {
            old_start: 1,
            old_lines: 0,
            new_start: 1,
            new_lines: added.len() as u32,
            lines,
        }],
        language: Language::from_path(path),
        binary: false,
    }
}

fn diff_of(files: Vec<FileChange>) -> Diff {
    Diff {
        head_commit: "feedface01".into(),
        base_ref: "HEAD".into(),
        files,
    }
}

fn hot_diff() -> Diff {
    diff_of(vec![change(
        "src/hot.rs",
        &["let retry = backoff(attempts);", "queue.push(job);"],
    )])
}

async fn run(
    diff: &Diff,
    gateway: &GraphGateway,
    llm: Option<&PlannerClient>,
    options: &AssessOptions,
) -> risk_pipeline::model::RiskAssessment {
    let cache = MetricCache::new();
    let config = risk_pipeline::config::PolicyConfig::default();
    let deps = PipelineDeps {
        gateway,
        llm,
        metric_cache: &cache,
        config: &config,
    };
    assess_diff(diff, options, &deps).await.unwrap()
}

#[tokio::test]
async fn docs_only_diff_returns_low_without_investigation() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let diff = diff_of(vec![change("README.md", &["## New section"])]);
    let a = run(&diff, &gateway, None, &AssessOptions::default()).await;

    assert_eq!(a.phase0_tag, ModificationType::DocsOnly);
    assert_eq!(a.tier, Tier::Low);
    assert!(a.investigation_id.is_none());
    assert!(a.terminated_reason.is_none());
    assert_eq!(a.exit_code(), 0);
}

#[tokio::test]
async fn risky_config_change_escalates_to_high_and_cites_the_key() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let diff = diff_of(vec![change(
        ".env.production",
        &["DATABASE_URL=postgres://prod-db:5432/app"],
    )]);
    let options = AssessOptions {
        ai_mode: AiMode::Off,
        ..Default::default()
    };
    let a = run(&diff, &gateway, None, &options).await;

    assert_eq!(a.phase0_tag, ModificationType::Config);
    assert!(a.tier >= Tier::High);
    assert!(a.summary.contains("DATABASE_URL"));
    assert!(a.terminated_reason.is_none());
}

#[tokio::test]
async fn test_only_diff_is_low_with_high_confidence() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let diff = diff_of(vec![change("tests/new_case.rs", &["#[test]", "fn ok() {}"])]);
    let a = run(&diff, &gateway, None, &AssessOptions::default()).await;

    assert_eq!(a.phase0_tag, ModificationType::TestsOnly);
    assert_eq!(a.tier, Tier::Low);
    assert!(a.confidence >= 0.9);
    assert!(a.investigation_id.is_none());
}

#[tokio::test]
async fn rename_only_diff_is_structural_and_skips_investigation() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let diff = diff_of(vec![FileChange {
        path: "src/renamed.rs".into(),
        change_type: ChangeType::Rename {
            from: "src/original.rs".into(),
        },
        added_lines: 0,
        removed_lines: 0,
        hunks: vec![],
        language: Language::Rust,
        binary: false,
    }]);
    let a = run(&diff, &gateway, None, &AssessOptions::default()).await;

    assert_eq!(a.phase0_tag, ModificationType::Structural);
    assert_eq!(a.tier, Tier::Low);
    assert!(a.investigation_id.is_none());
}

#[tokio::test]
async fn hot_file_runs_investigation_and_cites_evidence() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let llm = PlannerClient::Replay(ReplayClient::new([
        "RATING: high\n\
         SIGNAL: continue\n\
         EXPAND: cochange file:src/hot.rs\n\
         CONCERN: 0.9 file:src/pair.rs tight co-change partner of the edited file\n\
         CONCERN: 0.8 incident:1 prior outage caused by this file\n\
         SUMMARY: Hub file with incident history.",
        "RATING: high\n\
         SIGNAL: stop_high\n\
         CONCERN: 0.9 file:src/pair.rs co-change partner likely needs the same edit\n\
         SUMMARY: Risk confirmed.",
    ]));

    let a = run(&hot_diff(), &gateway, Some(&llm), &AssessOptions::default()).await;

    assert!(a.phase1_tier >= Tier::High);
    assert!(a.tier >= Tier::High);
    assert!(a.investigation_id.is_some());
    assert!(a.terminated_reason.is_none());
    assert!(
        a.citations
            .iter()
            .any(|e| e.kind_str() == "incident"),
        "expected an incident citation, got {:?}",
        a.citations
    );
    assert!(a.citations.iter().any(|e| e.kind_str() == "co_change"));
    assert!(a.exit_code() >= 1);
}

#[tokio::test]
async fn llm_outage_degrades_but_keeps_phase1_tier() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let llm = PlannerClient::Replay(ReplayClient::unavailable());
    let a = run(&hot_diff(), &gateway, Some(&llm), &AssessOptions::default()).await;

    assert!(a.tier >= Tier::High);
    assert_eq!(
        a.terminated_reason,
        Some(TerminatedReason::DependencyUnavailable)
    );
    assert!(a.confidence <= 0.7 + 1e-6);
    assert_eq!(a.exit_code(), 3);
}

#[tokio::test]
async fn tiny_token_budget_terminates_during_hop_one() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let llm = PlannerClient::Replay(ReplayClient::new([
        "RATING: high\nSIGNAL: continue\nSUMMARY: should never be reached.",
    ]));
    let options = AssessOptions {
        budget: Some(Budget {
            max_tokens: 100,
            ..Default::default()
        }),
        ..Default::default()
    };
    let a = run(&hot_diff(), &gateway, Some(&llm), &options).await;

    assert_eq!(a.terminated_reason, Some(TerminatedReason::BudgetExhausted));
    assert!(a.tier >= Tier::High, "best-effort tier from phase 1");
    assert!(a.confidence < 1.0);
}

#[tokio::test]
async fn token_budget_bounds_usage_across_hops() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    // Fat replies make the spend accumulate hop over hop; enough scripts
    // that only the budget can stop the investigation.
    let padding = "the hub file keeps accumulating co-change partners ".repeat(24);
    let hop_reply = format!("RATING: high\nSIGNAL: continue\nSUMMARY: {padding}");
    let llm = PlannerClient::Replay(ReplayClient::new([
        hop_reply.clone(),
        hop_reply.clone(),
        hop_reply,
        format!("SUMMARY: {padding}\nCONFIDENCE: 0.8\nRATING: high"),
    ]));

    let classification = risk_pipeline::model::Classification {
        modification_type: ModificationType::Behavioral,
        force_escalate: false,
        skip_phase2: false,
        tier_floor: Tier::Low,
        matched_rules: vec![],
    };
    let phase1 = risk_pipeline::model::Phase1Output {
        per_file: vec![],
        tier: Tier::High,
        max_score: 0.7,
        confidence_penalty: 0.0,
        warnings: vec![],
    };
    let budget = Budget {
        max_tokens: 1_800,
        ..Default::default()
    };
    let config = risk_pipeline::config::PolicyConfig::default();

    let outcome = risk_pipeline::investigate::investigate(
        &gateway,
        &llm,
        &config,
        &hot_diff(),
        &classification,
        &phase1,
        budget.clone(),
        &CancellationToken::new(),
    )
    .await;

    let inv = &outcome.investigation;
    assert_eq!(inv.terminated_reason, Some(TerminatedReason::BudgetExhausted));
    assert!(!inv.hops.is_empty(), "at least one hop should fit the budget");
    assert!(
        inv.total_tokens <= budget.max_tokens,
        "recorded usage {} exceeds the token budget {}",
        inv.total_tokens,
        budget.max_tokens
    );
}

#[tokio::test]
async fn oversized_diff_disables_investigation_but_still_assesses() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let mut big = change("src/hot.rs", &["let x = 1;"]);
    big.added_lines = 20_000;
    let diff = diff_of(vec![big]);

    let llm = PlannerClient::Replay(ReplayClient::new(["unused"]));
    let a = run(&diff, &gateway, Some(&llm), &AssessOptions::default()).await;

    assert!(a.investigation_id.is_none());
    assert!(a.warnings.iter().any(|w| w.contains("changed lines")));
}

#[tokio::test]
async fn cancellation_returns_partial_assessment() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = AssessOptions {
        cancel,
        ..Default::default()
    };
    let llm = PlannerClient::Replay(ReplayClient::new(["unused"]));
    let a = run(&hot_diff(), &gateway, Some(&llm), &options).await;

    assert_eq!(a.terminated_reason, Some(TerminatedReason::Cancelled));
    assert!(a.tier >= Tier::High, "phase-1 tier survives cancellation");
}

#[tokio::test]
async fn empty_diff_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let cache = MetricCache::new();
    let config = risk_pipeline::config::PolicyConfig::default();
    let deps = PipelineDeps {
        gateway: &gateway,
        llm: None,
        metric_cache: &cache,
        config: &config,
    };
    let err = assess_diff(&diff_of(vec![]), &AssessOptions::default(), &deps)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        risk_pipeline::errors::Error::Input(risk_pipeline::errors::InputError::NoChanges(_))
    ));
}

#[tokio::test]
async fn assessment_is_idempotent_with_replayed_llm() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    let scripts = || {
        PlannerClient::Replay(ReplayClient::new([
            "RATING: high\n\
             SIGNAL: continue\n\
             CONCERN: 0.9 file:src/pair.rs tight co-change partner\n\
             SUMMARY: Hub file.",
            "RATING: high\nSIGNAL: stop_high\nSUMMARY: severe risk confirmed.",
        ]))
    };

    let first = run(&hot_diff(), &gateway, Some(&scripts()), &AssessOptions::default()).await;
    let second = run(&hot_diff(), &gateway, Some(&scripts()), &AssessOptions::default()).await;

    assert_eq!(first.tier, second.tier);
    assert_eq!(first.score, second.score);
    assert_eq!(first.investigation_id, second.investigation_id);
    assert_eq!(first.citations.len(), second.citations.len());
    for (a, b) in first.citations.iter().zip(&second.citations) {
        assert_eq!(a.kind_str(), b.kind_str());
        assert_eq!(a.source_node_id(), b.source_node_id());
    }
}

#[tokio::test]
async fn monotone_escalation_holds_even_when_llm_says_low() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let gateway = open_gateway(dir.path());

    // The planner tries to talk the tier down; phase 1 rated HIGH, so the
    // final tier must stay at least HIGH.
    let llm = PlannerClient::Replay(ReplayClient::new([
        "RATING: low\nSIGNAL: continue\nSUMMARY: looks okay.",
        "RATING: low\nSIGNAL: continue\nSUMMARY: still okay.",
        "RATING: low\nSIGNAL: continue\nSUMMARY: fine.",
        "SUMMARY: Nothing concerning found. All clear. Ship it.\nCONFIDENCE: 0.9\nRATING: low",
    ]));
    let a = run(&hot_diff(), &gateway, Some(&llm), &AssessOptions::default()).await;

    assert!(a.phase1_tier >= Tier::High);
    assert!(a.tier >= a.phase1_tier, "LLM must not lower the tier");
    assert_eq!(a.phase2_tier.map(|t| t <= Tier::Medium), Some(true));
}
