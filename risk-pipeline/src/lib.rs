//! Pre-commit code-risk assessment pipeline.
//!
//! Single high-level entry to run the whole three-phase pipeline for one
//! change set:
//!
//! 1. **Phase 0 — classification** (`classify`): deterministic triage of
//!    the diff to a modification type with force/skip flags and a tier
//!    floor. No I/O.
//! 2. **Phase 1 — baseline metrics** (`metrics`): coupling, co-change,
//!    ownership-churn, incident and test-ratio scores per changed file,
//!    computed through the graph gateway with caching and clamped
//!    degradation.
//! 3. **Phase 2 — investigation** (`investigate`): LLM-driven hop-by-hop
//!    graph navigation under a strict budget, producing evidence-grounded
//!    citations and a synthesized summary. Runs only when Phase-1 signals
//!    or Phase-0 flags warrant.
//!
//! The orchestrator enforces the monotone-escalation invariant — the
//! final tier is `max(phase0_floor, phase1_tier, phase2_tier)`; the LLM
//! can raise a tier but never lower one — and always returns a
//! `RiskAssessment` unless the input itself is unreadable.
//!
//! The pipeline uses `tracing` for step-level debug logging and avoids
//! `async-trait` and heap trait objects. Storage and LLM access are
//! enum-dispatched capabilities passed in via [`PipelineDeps`].

pub mod classify;
pub mod config;
pub mod errors;
pub mod investigate;
pub mod metrics;
pub mod model;
pub mod telemetry;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use git_diff_engine::{Diff, ExtractOptions};
use graph_gateway::{GraphGateway, MetricCache, NodeId};

use crate::config::PolicyConfig;
use crate::errors::{Error, InputError, RiskResult};
use crate::model::{
    AiMode, AssessOptions, BaselineMetrics, Classification, Evidence, Phase1Output, Provenance,
    RiskAssessment, TerminatedReason, Tier,
};

pub use investigate::{InvestigationOutcome, PlannerClient, ReplayClient};
pub use model::Budget;

/// Capabilities an assessment borrows: storage, optional LLM, the shared
/// metric cache, and policy. Nothing is owned, so concurrent assessments
/// share read-only state safely.
pub struct PipelineDeps<'a> {
    pub gateway: &'a GraphGateway,
    pub llm: Option<&'a PlannerClient>,
    pub metric_cache: &'a MetricCache<BaselineMetrics>,
    pub config: &'a PolicyConfig,
}

/// Extract the diff from a working tree and assess it.
///
/// # Errors
/// Only input problems surface: [`InputError::NotARepository`],
/// [`InputError::NoChanges`], or git subprocess failures.
pub async fn assess(
    repo_root: &Path,
    options: &AssessOptions,
    deps: &PipelineDeps<'_>,
) -> RiskResult<RiskAssessment> {
    let extract_opts = ExtractOptions {
        base_ref: options.base_ref.clone(),
        staged_only: options.staged_only,
    };
    let diff = git_diff_engine::extract(repo_root, &extract_opts).await?;
    assess_diff(&diff, options, deps).await
}

/// Assess an already-extracted diff.
pub async fn assess_diff(
    diff: &Diff,
    options: &AssessOptions,
    deps: &PipelineDeps<'_>,
) -> RiskResult<RiskAssessment> {
    if diff.is_empty() {
        return Err(Error::Input(InputError::NoChanges(diff.base_ref.clone())));
    }

    let t0 = Instant::now();
    let cfg = deps.config;
    let deadline_ms = cfg.timeout_ms(options.deep);
    let mut warnings: Vec<String> = Vec::new();
    let mut terminated: Option<TerminatedReason> = None;

    // ---------------------------
    // Phase 0: classification
    // ---------------------------
    debug!("assess: phase 0 (classify)");
    let phase0 = classify::classify(diff, &cfg.classifier);

    let oversized = diff.oversized(cfg.large_diff_line_limit);
    if oversized {
        warnings.push(format!(
            "diff exceeds {} changed lines; investigation disabled",
            cfg.large_diff_line_limit
        ));
    }

    // ---------------------------------------------
    // Fast path: cheap scan for skip_phase2 changes
    // ---------------------------------------------
    if phase0.skip_phase2 && phase0.tier_floor == Tier::Low && options.ai_mode != AiMode::Force {
        debug!("assess: fast path (minimal phase 1)");
        let phase1 = run_phase1(diff, deps, true).await;
        let assessment = assemble(
            diff, &phase0, &phase1, None, warnings, terminated, t0, deps,
        )
        .await;
        return Ok(assessment);
    }

    // ---------------------------
    // Phase 1: baseline metrics
    // ---------------------------
    debug!("assess: phase 1 (metrics)");
    let t1 = Instant::now();
    let phase1 = match tokio::time::timeout(
        Duration::from_millis(cfg.phase1_timeout_ms),
        run_phase1(diff, deps, false),
    )
    .await
    {
        Ok(p) => p,
        Err(_) => {
            warn!("assess: phase 1 timed out after {} ms", cfg.phase1_timeout_ms);
            terminated = Some(TerminatedReason::Timeout);
            Phase1Output {
                per_file: Vec::new(),
                tier: phase0.tier_floor,
                max_score: 0.0,
                confidence_penalty: 0.3,
                warnings: vec!["phase 1 timed out; metrics unavailable".to_string()],
            }
        }
    };
    debug!(
        "assess: phase 1 done tier={} ({} ms)",
        phase1.tier,
        t1.elapsed().as_millis()
    );

    if options.cancel.is_cancelled() {
        terminated = Some(TerminatedReason::Cancelled);
        let assessment = assemble(
            diff, &phase0, &phase1, None, warnings, terminated, t0, deps,
        )
        .await;
        return Ok(assessment);
    }

    // ---------------------------
    // Phase 2: investigation
    // ---------------------------
    let escalate = phase1.tier >= Tier::Medium
        || phase0.force_escalate
        || options.ai_mode == AiMode::Force;
    let mut outcome: Option<InvestigationOutcome> = None;

    if escalate && !oversized && options.ai_mode != AiMode::Off {
        match deps.llm {
            Some(llm) => {
                debug!("assess: phase 2 (investigate)");
                let mut budget = options.budget.clone().unwrap_or_else(|| cfg.budget.clone());
                let remaining = deadline_ms.saturating_sub(t0.elapsed().as_millis() as u64);
                budget.max_latency_ms = budget.max_latency_ms.min(remaining.max(1));

                let inv_outcome = investigate::investigate(
                    deps.gateway,
                    llm,
                    cfg,
                    diff,
                    &phase0,
                    &phase1,
                    budget,
                    &options.cancel,
                )
                .await;
                terminated = terminated.or(inv_outcome.investigation.terminated_reason);
                outcome = Some(inv_outcome);
            }
            None => {
                warnings.push("investigation skipped: no LLM configured".to_string());
                terminated = terminated.or(Some(TerminatedReason::DependencyUnavailable));
            }
        }
    }

    let assessment = assemble(
        diff, &phase0, &phase1, outcome, warnings, terminated, t0, deps,
    )
    .await;
    info!(
        "assess: done tier={} score={:.1} confidence={:.2} ({} ms)",
        assessment.tier,
        assessment.score,
        assessment.confidence,
        assessment.elapsed_ms
    );
    Ok(assessment)
}

async fn run_phase1(diff: &Diff, deps: &PipelineDeps<'_>, minimal: bool) -> Phase1Output {
    metrics::compute(
        diff,
        deps.gateway,
        deps.metric_cache,
        &deps.config.phase1,
        minimal,
    )
    .await
}

/// Build the final assessment: monotone tier, blended score, grounded
/// citations, composed summary.
#[allow(clippy::too_many_arguments)]
async fn assemble(
    diff: &Diff,
    phase0: &Classification,
    phase1: &Phase1Output,
    outcome: Option<InvestigationOutcome>,
    mut warnings: Vec<String>,
    terminated: Option<TerminatedReason>,
    t0: Instant,
    deps: &PipelineDeps<'_>,
) -> RiskAssessment {
    warnings.extend(phase1.warnings.iter().cloned());

    let phase2_tier = outcome.as_ref().and_then(|o| o.tier);
    let final_tier = phase0
        .tier_floor
        .max(phase1.tier)
        .max(phase2_tier.unwrap_or(Tier::Low));

    let phase1_score = phase1.max_score * 100.0;
    let score = outcome
        .as_ref()
        .and_then(|o| o.score)
        .map_or(phase1_score, |s| s.max(phase1_score));

    // Confidence: investigation factor × phase-1 degradation, with a flat
    // penalty when escalation was wanted but no investigator ran.
    let mut confidence = outcome.as_ref().map_or(1.0, |o| o.confidence);
    if outcome.is_none() && terminated == Some(TerminatedReason::DependencyUnavailable) {
        confidence *= 0.7;
    }
    if terminated == Some(TerminatedReason::Timeout)
        || terminated == Some(TerminatedReason::Cancelled)
    {
        confidence *= 0.7;
    }
    confidence = (confidence * (1.0 - phase1.confidence_penalty)).clamp(0.0, 1.0);

    // Citations: phase-1 signal evidence plus investigation evidence,
    // every item re-grounded through the gateway.
    let mut citations = phase1_evidence(phase1, &deps.config.phase1);
    if let Some(o) = &outcome {
        citations.extend(o.investigation.evidence.iter().cloned());
        warnings.extend(o.warnings.iter().cloned());
    }
    let citations = ground_citations(deps.gateway, citations, &mut warnings).await;

    let per_category = outcome
        .as_ref()
        .filter(|o| !o.per_category.is_empty())
        .map(|o| o.per_category.clone())
        .unwrap_or_else(|| phase1_categories(phase1));

    let summary = match outcome.as_ref().and_then(|o| o.summary.clone()) {
        Some(s) => s,
        None => baseline_summary(final_tier, phase0, phase1, terminated),
    };

    let investigation = outcome.map(|o| o.investigation);
    let assessment = RiskAssessment {
        tier: final_tier,
        score,
        confidence,
        summary,
        per_category_scores: per_category,
        citations,
        investigation_id: investigation.as_ref().map(|i| i.id.clone()),
        phase0_tag: phase0.modification_type,
        phase1_tier: phase1.tier,
        phase2_tier,
        terminated_reason: terminated,
        warnings,
        elapsed_ms: t0.elapsed().as_millis() as u64,
    };
    maybe_record(deps, diff, &assessment, investigation.as_ref());
    assessment
}

/// Turn strong Phase-1 signals into typed evidence rows (hop 0).
fn phase1_evidence(phase1: &Phase1Output, cfg: &config::Phase1Config) -> Vec<Evidence> {
    let mut out = Vec::new();
    for m in &phase1.per_file {
        if let Some(partner) = &m.top_co_change_partner {
            if m.co_change_frequency >= cfg.co_change_floor {
                out.push(Evidence::CoChange {
                    source_node_id: NodeId::file(partner),
                    weight: m.co_change_frequency,
                    human_description: format!(
                        "{} co-changes with {} in {:.0}% of commits",
                        m.path,
                        partner,
                        m.co_change_frequency * 100.0
                    ),
                    provenance: Provenance {
                        query: "co_changed".to_string(),
                        hop: 0,
                    },
                });
            }
        }
        if m.incident_count > 0 {
            out.push(Evidence::Incident {
                source_node_id: NodeId::file(&m.path),
                weight: m.incident_score,
                human_description: format!(
                    "{} caused {} incident(s) in the lookback window",
                    m.path, m.incident_count
                ),
                provenance: Provenance {
                    query: "incidents".to_string(),
                    hop: 0,
                },
            });
        }
        if m.coupling_score >= 0.5 {
            out.push(Evidence::Dependency {
                source_node_id: NodeId::file(&m.path),
                weight: m.coupling_score,
                human_description: format!(
                    "{} is a dependency hub (coupling {:.2})",
                    m.path, m.coupling_score
                ),
                provenance: Provenance {
                    query: "neighbors".to_string(),
                    hop: 0,
                },
            });
        }
        if m.ownership_churn >= 0.6 {
            out.push(Evidence::Ownership {
                source_node_id: NodeId::file(&m.path),
                weight: m.ownership_churn,
                human_description: format!(
                    "{} has dispersed ownership (churn {:.2})",
                    m.path, m.ownership_churn
                ),
                provenance: Provenance {
                    query: "ownership".to_string(),
                    hop: 0,
                },
            });
        }
    }
    out
}

/// Drop citations the gateway does not acknowledge. Keeps the
/// citation-grounding invariant even against drifted snapshots.
async fn ground_citations(
    gateway: &GraphGateway,
    citations: Vec<Evidence>,
    warnings: &mut Vec<String>,
) -> Vec<Evidence> {
    let mut grounded = Vec::with_capacity(citations.len());
    for e in citations {
        match gateway.resolve_node(e.source_node_id()).await {
            Ok(Some(_)) => grounded.push(e),
            Ok(None) => {
                debug!("citation dropped (unknown node {})", e.source_node_id());
            }
            Err(err) => {
                let w = format!("citation grounding unavailable: {err}");
                if !warnings.contains(&w) {
                    warnings.push(w);
                }
            }
        }
    }
    grounded
}

fn phase1_categories(phase1: &Phase1Output) -> BTreeMap<String, f32> {
    let mut cats = BTreeMap::new();
    let fold = |f: fn(&BaselineMetrics) -> f32| {
        phase1.per_file.iter().map(f).fold(0.0_f32, f32::max)
    };
    cats.insert("coupling".to_string(), fold(|m| m.coupling_score));
    cats.insert("co_change".to_string(), fold(|m| m.co_change_frequency));
    cats.insert("incident".to_string(), fold(|m| m.incident_score));
    cats.insert("ownership".to_string(), fold(|m| m.ownership_churn));
    cats
}

/// Summary when no synthesis text exists: classifier reasoning plus the
/// strongest baseline signal, with the degradation spelled out.
fn baseline_summary(
    tier: Tier,
    phase0: &Classification,
    phase1: &Phase1Output,
    terminated: Option<TerminatedReason>,
) -> String {
    let mut s = format!(
        "{} risk {} change.",
        tier,
        phase0.modification_type.as_str()
    );
    if let Some(rule) = phase0.matched_rules.first() {
        s.push_str(&format!(" Triggered by {rule}."));
    } else if let Some(top) = phase1
        .per_file
        .iter()
        .max_by(|a, b| a.file_score.partial_cmp(&b.file_score).unwrap_or(std::cmp::Ordering::Equal))
    {
        s.push_str(&format!(
            " Strongest signal: {} (score {:.2}, {} incidents).",
            top.path, top.file_score, top.incident_count
        ));
    }
    if let Some(reason) = terminated {
        s.push_str(&format!(
            " Assessment degraded ({}); tier reflects baseline signals only.",
            reason.as_str()
        ));
    }
    investigate::truncate_sentences(&s, 3)
}

fn maybe_record(
    deps: &PipelineDeps<'_>,
    diff: &Diff,
    assessment: &RiskAssessment,
    investigation: Option<&model::Investigation>,
) {
    if let Some(dir) = &deps.config.telemetry_dir {
        telemetry::record(dir, diff, assessment, investigation);
    }
}
