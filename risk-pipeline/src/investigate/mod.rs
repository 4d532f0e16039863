//! Phase-2 investigator: LLM-driven hop-by-hop graph investigation.
//!
//! A small state machine: `Collecting → Hop1 → Hop2 → Hop3 →
//! Synthesizing → Done | Terminated`. Each hop sends the planner one
//! structured prompt and parses a structured reply; between hops the
//! requested neighborhoods are fetched (validated against the current
//! subview first) and merged. Hops are strictly sequential — each depends
//! on the previous reply.
//!
//! Budgets (tokens, hops, wall-clock, cost) are checked before every LLM
//! call; any breach terminates the investigation with the best assessment
//! constructible from evidence already gathered, at reduced confidence.
//! The investigator borrows the gateway as a capability and never owns
//! storage.

pub mod evidence;
pub mod llm_client;
pub mod policy;
pub mod prompt;
pub mod subview;

use std::collections::BTreeMap;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ai_llm_service::Generation;
use git_diff_engine::Diff;
use graph_gateway::{GraphGateway, GraphNode, NodeKind};

use crate::config::PolicyConfig;
use crate::errors::LlmCallError;
use crate::metrics::scoring;
use crate::model::{
    Budget, Classification, HopResult, Investigation, Phase1Output, StopSignal, TerminatedReason,
    Tier,
};

pub use llm_client::{PlannerClient, ReplayClient};
use policy::{HopReply, SynthesisReply};
use subview::GraphSubview;

/// Confidence multiplier for a terminated investigation.
const TERMINATED_CONFIDENCE_SCALE: f32 = 0.7;
/// Confidence for a deterministic early exit (no synthesis call).
const EARLY_EXIT_CONFIDENCE: f32 = 0.9;
/// Confidence when synthesis had to fall back to the heuristic summary.
const HEURISTIC_SUMMARY_CONFIDENCE: f32 = 0.6;
/// Expansion caps per hop index (hop 3 is terminal for expansion).
const EXPANSIONS_PER_HOP: [usize; 3] = [3, 1, 0];

/// What Phase 2 concluded.
#[derive(Debug)]
pub struct InvestigationOutcome {
    pub investigation: Investigation,
    /// Phase-2 tier; `None` when nothing could be concluded.
    pub tier: Option<Tier>,
    /// Blended evidence score in [0,100].
    pub score: Option<f32>,
    pub summary: Option<String>,
    pub per_category: BTreeMap<String, f32>,
    /// Multiplier applied to the assessment confidence.
    pub confidence: f32,
    pub warnings: Vec<String>,
}

/// Token/latency/cost accounting for one investigation.
struct BudgetLedger {
    budget: Budget,
    started: Instant,
    tokens: u64,
    cost_cents: f32,
}

impl BudgetLedger {
    fn new(budget: Budget) -> Self {
        Self {
            budget,
            started: Instant::now(),
            tokens: 0,
            cost_cents: 0.0,
        }
    }

    fn charge(&mut self, generation: &Generation, prompt_len: usize, client: &PlannerClient) -> u32 {
        let used = generation.estimated_total_tokens(prompt_len);
        self.tokens += used as u64;
        self.cost_cents += client.cost_cents(used as u64);
        used
    }

    /// Check limits before an LLM call. The projection covers the
    /// prompt's own cost plus the provider's completion allowance, so
    /// a call that is dispatched cannot land recorded usage past the
    /// token budget.
    fn breach_before_call(
        &self,
        next_prompt_len: usize,
        completion_allowance: u64,
    ) -> Option<&'static str> {
        let projected = self.tokens + (next_prompt_len / 4) as u64 + completion_allowance;
        if projected > self.budget.max_tokens {
            return Some("token budget exhausted");
        }
        if self.started.elapsed().as_millis() as u64 >= self.budget.max_latency_ms {
            return Some("latency budget exhausted");
        }
        if self.cost_cents >= self.budget.max_cost_cents {
            return Some("cost budget exhausted");
        }
        None
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Run the investigation. Never fails: every degradation path folds into
/// the returned outcome.
#[allow(clippy::too_many_arguments)]
pub async fn investigate(
    gateway: &GraphGateway,
    llm: &PlannerClient,
    cfg: &PolicyConfig,
    diff: &Diff,
    classification: &Classification,
    phase1: &Phase1Output,
    budget: Budget,
    cancel: &CancellationToken,
) -> InvestigationOutcome {
    let mut warnings: Vec<String> = Vec::new();
    let mut inv = Investigation::new(investigation_id(diff));
    let mut ledger = BudgetLedger::new(budget);

    debug!(
        "phase2: start id={} max_hops={} max_tokens={}",
        inv.id, ledger.budget.max_hops, ledger.budget.max_tokens
    );

    // Collecting: initial 1-hop neighborhood plus seeded incident search.
    let mut subview = GraphSubview::collect_initial(gateway, diff, &mut warnings).await;
    seed_incident_search(gateway, llm, classification, &mut subview).await;

    let max_hops = ledger.budget.max_hops.min(3);
    let mut last_rating: Option<Tier> = None;
    let mut early_exit = false;

    let mut hop: u8 = 1;
    while hop <= max_hops {
        if cancel.is_cancelled() {
            return finish_terminated(inv, ledger, cfg, TerminatedReason::Cancelled, warnings);
        }

        let max_expansions = EXPANSIONS_PER_HOP[(hop - 1) as usize];
        let hop_prompt =
            prompt::hop_prompt(hop, max_expansions.max(1), diff, classification, phase1, &subview);

        if let Some(reason) = ledger.breach_before_call(hop_prompt.len(), llm.completion_allowance())
        {
            warnings.push(format!("hop {hop}: {reason}"));
            return finish_terminated(inv, ledger, cfg, TerminatedReason::BudgetExhausted, warnings);
        }

        let (raw, tokens, elapsed_ms, reply) =
            match call_hop(llm, &hop_prompt, &mut ledger).await {
                Ok(v) => v,
                Err(e) => {
                    warnings.push(format!("hop {hop}: {e}"));
                    return finish_terminated(
                        inv,
                        ledger,
                        cfg,
                        TerminatedReason::DependencyUnavailable,
                        warnings,
                    );
                }
            };

        let declared = match &reply {
            Some(r) => r.signal,
            None => {
                warnings.push(format!("hop {hop}: malformed reply; continuing without guidance"));
                StopSignal::Continue
            }
        };
        let effective = effective_signal(hop, declared, &raw, phase1.tier);

        inv.hops.push(HopResult {
            hop_index: hop,
            shown_nodes: subview.node_ids(),
            llm_response: raw,
            tokens_used: tokens,
            elapsed_ms,
            signal: effective,
        });

        if let Some(r) = &reply {
            last_rating = Some(last_rating.map_or(r.rating, |p| p.max(r.rating)));
            inv.evidence
                .extend(evidence::from_concerns(&r.concerns, &subview, hop));
        }

        let stop_now = match effective {
            StopSignal::StopHigh => phase1.tier >= Tier::Medium,
            StopSignal::StopLow => phase1.tier == Tier::Low,
            StopSignal::Continue => false,
        };
        if stop_now {
            debug!("phase2: early exit at hop {hop} ({effective:?})");
            early_exit = true;
            break;
        }
        if hop == max_hops {
            break;
        }

        if let Some(r) = &reply {
            for req in subview::validate_requests(&r.expansions, &subview, max_expansions) {
                if cancel.is_cancelled() {
                    return finish_terminated(
                        inv,
                        ledger,
                        cfg,
                        TerminatedReason::Cancelled,
                        warnings,
                    );
                }
                match req.fetch(gateway).await {
                    Ok(hood) => subview.merge(hood),
                    Err(e) => warnings.push(format!("expansion skipped: {e}")),
                }
            }
        }

        hop += 1;
    }

    // Early exit: verdict from the interim rating, no synthesis call.
    if early_exit {
        let (score, cats) = evidence::blend(&inv.evidence);
        let tier = last_rating;
        let summary = heuristic_summary(tier, &inv.evidence, classification);
        inv.total_tokens = ledger.tokens;
        inv.total_elapsed_ms = ledger.elapsed_ms();
        return InvestigationOutcome {
            investigation: inv,
            tier,
            score: Some(score),
            summary: Some(summary),
            per_category: cats,
            confidence: EARLY_EXIT_CONFIDENCE,
            warnings,
        };
    }

    // Synthesizing.
    if cancel.is_cancelled() {
        return finish_terminated(inv, ledger, cfg, TerminatedReason::Cancelled, warnings);
    }
    let digest = evidence::digest(&inv.evidence, 8);
    let synth_prompt = prompt::synthesis_prompt(diff, classification, phase1, &subview, &digest);
    if let Some(reason) =
        ledger.breach_before_call(synth_prompt.len(), llm.completion_allowance())
    {
        warnings.push(format!("synthesis: {reason}"));
        return finish_terminated(inv, ledger, cfg, TerminatedReason::BudgetExhausted, warnings);
    }

    let synth = match call_synthesis(llm, &synth_prompt, &mut ledger).await {
        Ok((_raw, _tokens, _elapsed, parsed)) => parsed,
        Err(e) => {
            warnings.push(format!("synthesis: {e}"));
            return finish_terminated(
                inv,
                ledger,
                cfg,
                TerminatedReason::DependencyUnavailable,
                warnings,
            );
        }
    };

    let (blend_score, mut cats) = evidence::blend(&inv.evidence);
    let blended_tier = scoring::tier_for_score(&cfg.phase1, blend_score / 100.0);

    let (summary, confidence, llm_tier) = match synth {
        Some(SynthesisReply {
            summary,
            confidence,
            rating,
            categories,
        }) => {
            for (k, v) in categories {
                cats.entry(k).or_insert(v);
            }
            (
                truncate_sentences(&summary, 3),
                confidence.unwrap_or(0.75),
                rating.or(last_rating),
            )
        }
        None => {
            warnings.push("synthesis: malformed twice; heuristic summary emitted".to_string());
            (
                heuristic_summary(last_rating, &inv.evidence, classification),
                HEURISTIC_SUMMARY_CONFIDENCE,
                last_rating,
            )
        }
    };

    // The model can raise the blended tier but never lower it.
    let tier = match llm_tier {
        Some(t) => blended_tier.max(t),
        None => blended_tier,
    };

    inv.total_tokens = ledger.tokens;
    inv.total_elapsed_ms = ledger.elapsed_ms();
    debug!(
        "phase2: done tier={tier} score={blend_score:.1} tokens={} hops={}",
        inv.total_tokens,
        inv.hops.len()
    );

    InvestigationOutcome {
        investigation: inv,
        tier: Some(tier),
        score: Some(blend_score),
        summary: Some(summary),
        per_category: cats,
        confidence,
        warnings,
    }
}

/* --------------------- LLM call helpers --------------------- */

/// One hop call with a single retry shared between transport failures and
/// malformed replies. A second malformed reply downgrades to "no
/// guidance" rather than failing the investigation.
async fn call_hop(
    llm: &PlannerClient,
    prompt: &str,
    ledger: &mut BudgetLedger,
) -> Result<(String, u32, u64, Option<HopReply>), LlmCallError> {
    let started = Instant::now();
    let mut tokens_total = 0u32;
    let mut attempt_prompt = prompt.to_string();

    for attempt in 0..2 {
        match llm.generate_hop(&attempt_prompt, prompt::HOP_SYSTEM).await {
            Ok(generation) => {
                tokens_total += ledger.charge(&generation, attempt_prompt.len(), llm);
                let raw = policy::strip_think(&generation.text);
                match policy::parse_hop_reply(&raw) {
                    Some(reply) => {
                        return Ok((
                            raw,
                            tokens_total,
                            started.elapsed().as_millis() as u64,
                            Some(reply),
                        ));
                    }
                    None if attempt == 0 => {
                        debug!("phase2: malformed hop reply; retrying with reminder");
                        attempt_prompt = format!("{prompt}\n\n{}", prompt::FORMAT_REMINDER);
                    }
                    None => {
                        return Ok((raw, tokens_total, started.elapsed().as_millis() as u64, None));
                    }
                }
            }
            Err(e) if attempt == 0 => {
                warn!("phase2: hop call failed ({e}); retrying once");
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("both attempts return")
}

/// Synthesis call with the same retry discipline.
async fn call_synthesis(
    llm: &PlannerClient,
    prompt: &str,
    ledger: &mut BudgetLedger,
) -> Result<(String, u32, u64, Option<SynthesisReply>), LlmCallError> {
    let started = Instant::now();
    let mut tokens_total = 0u32;
    let mut attempt_prompt = prompt.to_string();

    for attempt in 0..2 {
        match llm
            .generate_synthesis(&attempt_prompt, prompt::SYNTH_SYSTEM)
            .await
        {
            Ok(generation) => {
                tokens_total += ledger.charge(&generation, attempt_prompt.len(), llm);
                let raw = policy::strip_think(&generation.text);
                match policy::parse_synthesis_reply(&raw) {
                    Some(reply) => {
                        return Ok((
                            raw,
                            tokens_total,
                            started.elapsed().as_millis() as u64,
                            Some(reply),
                        ));
                    }
                    None if attempt == 0 => {
                        debug!("phase2: malformed synthesis reply; retrying with reminder");
                        attempt_prompt = format!("{prompt}\n\n{}", prompt::FORMAT_REMINDER);
                    }
                    None => {
                        return Ok((raw, tokens_total, started.elapsed().as_millis() as u64, None));
                    }
                }
            }
            Err(e) if attempt == 0 => {
                warn!("phase2: synthesis call failed ({e}); retrying once");
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("both attempts return")
}

/* --------------------- helpers --------------------- */

/// Stop signals on hop 1 take effect only when the deterministic keyword
/// scan permits them; later hops are trusted directly.
fn effective_signal(hop: u8, declared: StopSignal, raw: &str, phase1_tier: Tier) -> StopSignal {
    match declared {
        StopSignal::Continue => StopSignal::Continue,
        stop if hop == 1 => match policy::early_exit_permit(raw, phase1_tier) {
            Some(permitted) if permitted == stop => stop,
            _ => StopSignal::Continue,
        },
        stop => stop,
    }
}

/// Seed the subview with semantically related incidents for
/// force-escalated changes (config/security), so hop 1 can cite them.
async fn seed_incident_search(
    gateway: &GraphGateway,
    llm: &PlannerClient,
    classification: &Classification,
    subview: &mut GraphSubview,
) {
    if !classification.force_escalate || classification.matched_rules.is_empty() {
        return;
    }
    let query = classification.matched_rules.join(" ");
    let embedding = llm.embed(&query).await;
    match gateway
        .search_incidents(&query, embedding.as_deref(), 3)
        .await
    {
        Ok(hits) => {
            for hit in hits {
                subview.insert_node(GraphNode {
                    id: hit.node_id,
                    kind: NodeKind::Incident,
                    label: hit.title,
                });
            }
        }
        Err(e) => debug!("phase2: incident search unavailable: {e}"),
    }
}

fn finish_terminated(
    mut inv: Investigation,
    ledger: BudgetLedger,
    cfg: &PolicyConfig,
    reason: TerminatedReason,
    warnings: Vec<String>,
) -> InvestigationOutcome {
    inv.terminated_reason = Some(reason);
    inv.total_tokens = ledger.tokens;
    inv.total_elapsed_ms = ledger.elapsed_ms();

    let (score, cats) = evidence::blend(&inv.evidence);
    let tier = if inv.evidence.is_empty() {
        None
    } else {
        Some(scoring::tier_for_score(&cfg.phase1, score / 100.0))
    };

    debug!(
        "phase2: terminated reason={} tokens={} hops={}",
        reason.as_str(),
        inv.total_tokens,
        inv.hops.len()
    );

    InvestigationOutcome {
        investigation: inv,
        tier,
        score: Some(score),
        summary: None,
        per_category: cats,
        confidence: TERMINATED_CONFIDENCE_SCALE,
        warnings,
    }
}

/// Summary assembled from evidence when no synthesis text is available.
fn heuristic_summary(
    tier: Option<Tier>,
    evidence: &[crate::model::Evidence],
    classification: &Classification,
) -> String {
    let tier_text = tier.map_or("undetermined".to_string(), |t| t.to_string());
    let strongest = evidence.iter().max_by(|a, b| {
        a.weight()
            .partial_cmp(&b.weight())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    match strongest {
        Some(e) => format!(
            "Investigation rated this {} change {}; strongest signal: {}.",
            classification.modification_type.as_str(),
            tier_text,
            e.human_description()
        ),
        None => format!(
            "Investigation rated this {} change {} without graph evidence.",
            classification.modification_type.as_str(),
            tier_text
        ),
    }
}

/// Deterministic id: digest of the head commit, base, and changed paths.
fn investigation_id(diff: &Diff) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&diff.head_commit);
    hasher.update(&diff.base_ref);
    for p in diff.paths() {
        hasher.update(p);
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    format!("inv-{:x}", digest)[..20].to_string()
}

/// Keep at most `n` sentences of `s`.
pub(crate) fn truncate_sentences(s: &str, n: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    for chunk in s.split_inclusive(['.', '!', '?']) {
        out.push_str(chunk);
        count += 1;
        if count >= n {
            break;
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() { s.trim().to_string() } else { trimmed.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_sentences_caps_at_three() {
        let s = "One. Two! Three? Four.";
        assert_eq!(truncate_sentences(s, 3), "One. Two! Three?");
        assert_eq!(truncate_sentences("No terminator", 3), "No terminator");
    }

    #[test]
    fn investigation_id_is_deterministic() {
        let diff = Diff {
            head_commit: "abc".into(),
            base_ref: "HEAD".into(),
            files: vec![],
        };
        assert_eq!(investigation_id(&diff), investigation_id(&diff));
        assert!(investigation_id(&diff).starts_with("inv-"));
    }

    #[test]
    fn hop1_stop_needs_keyword_permit() {
        assert_eq!(
            effective_signal(1, StopSignal::StopHigh, "nothing to see", Tier::High),
            StopSignal::Continue
        );
        assert_eq!(
            effective_signal(1, StopSignal::StopHigh, "severe regression risk", Tier::High),
            StopSignal::StopHigh
        );
        assert_eq!(
            effective_signal(2, StopSignal::StopHigh, "nothing to see", Tier::High),
            StopSignal::StopHigh
        );
    }

    #[test]
    fn ledger_breaches_on_projected_tokens() {
        let ledger = BudgetLedger::new(Budget {
            max_tokens: 100,
            max_hops: 3,
            max_latency_ms: 60_000,
            max_cost_cents: 5.0,
        });
        // A 1000-char prompt projects to ~250 tokens > 100.
        assert_eq!(
            ledger.breach_before_call(1_000, 0),
            Some("token budget exhausted")
        );
        assert_eq!(ledger.breach_before_call(100, 0), None);
        // The completion allowance counts against the projection too:
        // 25 prompt tokens + 80 reserved > 100.
        assert_eq!(
            ledger.breach_before_call(100, 80),
            Some("token budget exhausted")
        );
    }
}
