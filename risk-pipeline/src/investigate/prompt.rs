//! Prompt builders for the investigation loop.
//!
//! Prompts carry the diff summary, the Phase-0 tag, the Phase-1 metric
//! table, and the rendered subview — node labels only, never raw code.
//! The reply contract is spelled out verbatim in every prompt so a
//! drifting model can be nudged back with a single reminder line.

use std::fmt::Write as _;

use git_diff_engine::{ChangeType, Diff};

use crate::model::{Classification, Phase1Output};

use super::subview::GraphSubview;

/// System prompt for hop turns.
pub const HOP_SYSTEM: &str = "\
You are a code-risk analyst navigating a repository knowledge graph.
- Judge only from the evidence shown; do not invent nodes or history.
- Reference nodes strictly by the ids listed in the prompt.
- Be terse. No markdown, no prose outside the required line format.";

/// System prompt for the synthesis turn.
pub const SYNTH_SYSTEM: &str = "\
You are a code-risk analyst writing the final verdict of an investigation.
- Summarize in at most three sentences, citing concrete evidence.
- Be terse. No markdown, no prose outside the required line format.";

/// Reminder appended when a reply did not follow the format.
pub const FORMAT_REMINDER: &str = "\
Your previous reply did not follow the required line format. Answer again \
using only the specified RATING/SIGNAL/EXPAND/CONCERN/SUMMARY lines.";

/// The per-hop reply contract.
const HOP_CONTRACT: &str = "\
Reply with exactly these line kinds and nothing else:
RATING: low|medium|high|critical
SIGNAL: continue|stop_low|stop_high
EXPAND: imports|cochange|ownership|incidents <node-id>
CONCERN: <importance 0.0-1.0> <node-id> <short reason>
SUMMARY: <one sentence>";

/// Build the prompt for hop `hop_index` (1-based).
pub fn hop_prompt(
    hop_index: u8,
    max_expansions: usize,
    diff: &Diff,
    classification: &Classification,
    phase1: &Phase1Output,
    subview: &GraphSubview,
) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "# Change Under Assessment");
    p.push_str(&diff_summary(diff, classification, phase1));

    let _ = writeln!(p, "\n# Graph Neighborhood (hop {hop_index})");
    p.push_str(&subview.render());

    let _ = writeln!(p, "\n# Task");
    match hop_index {
        1 => {
            let _ = writeln!(
                p,
                "Give an interim risk rating, a stop signal, and up to {max_expansions} \
                 expansion requests for nodes worth a closer look."
            );
        }
        2 => {
            let _ = writeln!(
                p,
                "Rank your top three concerns as CONCERN lines. If confidence is \
                 insufficient, request at most {max_expansions} further expansion."
            );
        }
        _ => {
            let _ = writeln!(
                p,
                "This is the final hop: no further expansions will be granted. \
                 State your concerns and rating."
            );
        }
    }
    p.push_str(HOP_CONTRACT);
    p
}

/// Build the synthesis prompt.
pub fn synthesis_prompt(
    diff: &Diff,
    classification: &Classification,
    phase1: &Phase1Output,
    subview: &GraphSubview,
    concerns_digest: &str,
) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "# Change Under Assessment");
    p.push_str(&diff_summary(diff, classification, phase1));

    let _ = writeln!(p, "\n# Evidence Gathered");
    if concerns_digest.is_empty() {
        p.push_str("(no concerns were raised during the investigation)\n");
    } else {
        p.push_str(concerns_digest);
    }

    let _ = writeln!(p, "\n# Graph Neighborhood (final)");
    p.push_str(&subview.render());

    let _ = writeln!(p, "\n# Task");
    p.push_str(
        "Produce the final assessment. Reply with exactly these line kinds:\n\
         SUMMARY: <at most three sentences>\n\
         CONFIDENCE: <0.0-1.0>\n\
         RATING: low|medium|high|critical\n\
         CATEGORY: <name> <0.0-1.0>   (one line per risk category)",
    );
    p
}

/// Compact textual view of the diff and the earlier phases.
fn diff_summary(diff: &Diff, classification: &Classification, phase1: &Phase1Output) -> String {
    let mut s = String::new();
    let _ = writeln!(
        s,
        "Base: {} @ {}",
        diff.base_ref,
        &diff.head_commit[..diff.head_commit.len().min(12)]
    );
    let _ = writeln!(
        s,
        "Phase-0 type: {} (force_escalate={}); Phase-1 tier: {}",
        classification.modification_type.as_str(),
        classification.force_escalate,
        phase1.tier
    );
    for rule in classification.matched_rules.iter().take(4) {
        let _ = writeln!(s, "Rule hit: {rule}");
    }
    s.push_str("Files:\n");
    for f in diff.files.iter().take(20) {
        let marker = match &f.change_type {
            ChangeType::Add => "A",
            ChangeType::Modify => "M",
            ChangeType::Delete => "D",
            ChangeType::Rename { .. } => "R",
        };
        let metrics = phase1.per_file.iter().find(|m| m.path == f.path);
        match metrics {
            Some(m) => {
                let _ = writeln!(
                    s,
                    "- [{marker}] {} (+{}/-{}) score={:.2} coupling={:.2} co_change={:.2} \
                     incidents={} churn={:.2}",
                    f.path,
                    f.added_lines,
                    f.removed_lines,
                    m.file_score,
                    m.coupling_score,
                    m.co_change_frequency,
                    m.incident_count,
                    m.ownership_churn
                );
            }
            None => {
                let _ = writeln!(s, "- [{marker}] {} (+{}/-{})", f.path, f.added_lines, f.removed_lines);
            }
        }
    }
    if diff.files.len() > 20 {
        let _ = writeln!(s, "- … {} more files elided", diff.files.len() - 20);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModificationType, Tier};
    use git_diff_engine::{FileChange, Language};

    fn fixture() -> (Diff, Classification, Phase1Output) {
        let diff = Diff {
            head_commit: "0123456789abcdef0123".into(),
            base_ref: "HEAD".into(),
            files: vec![FileChange {
                path: "src/db.rs".into(),
                change_type: ChangeType::Modify,
                added_lines: 40,
                removed_lines: 8,
                hunks: vec![],
                language: Language::Rust,
                binary: false,
            }],
        };
        let classification = Classification {
            modification_type: ModificationType::Behavioral,
            force_escalate: false,
            skip_phase2: false,
            tier_floor: Tier::Low,
            matched_rules: vec![],
        };
        let phase1 = Phase1Output {
            per_file: vec![],
            tier: Tier::High,
            max_score: 0.69,
            confidence_penalty: 0.0,
            warnings: vec![],
        };
        (diff, classification, phase1)
    }

    #[test]
    fn hop_prompt_carries_contract_and_context() {
        let (diff, cls, p1) = fixture();
        let subview = GraphSubview::default();
        let prompt = hop_prompt(1, 3, &diff, &cls, &p1, &subview);
        assert!(prompt.contains("RATING: low|medium|high|critical"));
        assert!(prompt.contains("src/db.rs"));
        assert!(prompt.contains("Phase-1 tier: HIGH"));
        assert!(prompt.contains("hop 1"));
        // Short commits must not panic the truncation.
        assert!(prompt.contains("0123456789ab"));
    }

    #[test]
    fn synthesis_prompt_includes_digest() {
        let (diff, cls, p1) = fixture();
        let subview = GraphSubview::default();
        let prompt = synthesis_prompt(&diff, &cls, &p1, &subview, "- 0.8 file:src/db.rs hub\n");
        assert!(prompt.contains("CONFIDENCE"));
        assert!(prompt.contains("file:src/db.rs hub"));
    }
}
