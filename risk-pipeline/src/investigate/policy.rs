//! Policy layer: parse, sanitize, and validate planner output.
//!
//! The planner answers in a strict line-oriented format; anything else is
//! malformed and triggers the retry path. Parsing is regex-based and
//! tolerant of surrounding prose, but the required lines must be present:
//! a hop reply needs `RATING:` and `SIGNAL:`, a synthesis reply needs
//! `SUMMARY:`. Reasoning-trace tags are stripped before parsing.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::{StopSignal, Tier};

lazy_static! {
    static ref RATING_RE: Regex =
        Regex::new(r"(?mi)^\s*RATING:\s*(low|medium|high|critical)\s*$").expect("static regex");
    static ref SIGNAL_RE: Regex =
        Regex::new(r"(?mi)^\s*SIGNAL:\s*(continue|stop_low|stop_high)\s*$")
            .expect("static regex");
    static ref EXPAND_RE: Regex =
        Regex::new(r"(?mi)^\s*EXPAND:\s*([a-z_]+)\s+(\S+)\s*$").expect("static regex");
    static ref CONCERN_RE: Regex =
        Regex::new(r"(?mi)^\s*CONCERN:\s*([01](?:\.\d+)?)\s+(\S+)\s+(.+)$")
            .expect("static regex");
    static ref SUMMARY_RE: Regex =
        Regex::new(r"(?mi)^\s*SUMMARY:\s*(.+)$").expect("static regex");
    static ref CONFIDENCE_RE: Regex =
        Regex::new(r"(?mi)^\s*CONFIDENCE:\s*([01](?:\.\d+)?)\s*$").expect("static regex");
    static ref CATEGORY_RE: Regex =
        Regex::new(r"(?mi)^\s*CATEGORY:\s*([a-z_]+)\s+([01](?:\.\d+)?)\s*$")
            .expect("static regex");
    static ref THINK_RE: Regex = Regex::new(r"(?s)<think>.*?</think>").expect("static regex");
}

/// Deterministic early-exit markers (lowercased containment scan).
pub const STOP_HIGH_MARKERS: [&str; 3] = ["critical", "severe", "very high risk"];
pub const STOP_LOW_MARKERS: [&str; 4] = ["minimal", "no significant", "safe to", "low risk"];

/// One `CONCERN:` line: model-assigned importance, cited node, reason.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcernLine {
    pub importance: f32,
    pub node_id: String,
    pub text: String,
}

/// Parsed hop response.
#[derive(Debug, Clone)]
pub struct HopReply {
    pub rating: Tier,
    pub signal: StopSignal,
    /// Raw `(op, node-id)` pairs; validated against the subview later.
    pub expansions: Vec<(String, String)>,
    pub concerns: Vec<ConcernLine>,
    pub summary: Option<String>,
}

/// Parsed synthesis response.
#[derive(Debug, Clone)]
pub struct SynthesisReply {
    pub summary: String,
    pub confidence: Option<f32>,
    pub rating: Option<Tier>,
    pub categories: Vec<(String, f32)>,
}

/// Strip reasoning-trace tags some local models emit.
pub fn strip_think(s: &str) -> String {
    let cleaned = THINK_RE.replace_all(s, "");
    cleaned.replace("<think>", "").replace("</think>", "")
}

/// Parse a hop reply; `None` means malformed (missing required lines).
pub fn parse_hop_reply(raw: &str) -> Option<HopReply> {
    let cleaned = strip_think(raw);

    let rating = RATING_RE
        .captures(&cleaned)
        .and_then(|c| Tier::parse(c.get(1)?.as_str()))?;
    let signal = SIGNAL_RE
        .captures(&cleaned)
        .and_then(|c| signal_from_str(c.get(1)?.as_str()))?;

    let expansions = EXPAND_RE
        .captures_iter(&cleaned)
        .filter_map(|c| {
            Some((c.get(1)?.as_str().to_string(), c.get(2)?.as_str().to_string()))
        })
        .collect();

    let concerns = CONCERN_RE
        .captures_iter(&cleaned)
        .filter_map(|c| {
            Some(ConcernLine {
                importance: c.get(1)?.as_str().parse::<f32>().ok()?.clamp(0.0, 1.0),
                node_id: c.get(2)?.as_str().to_string(),
                text: c.get(3)?.as_str().trim().to_string(),
            })
        })
        .collect();

    let summary = SUMMARY_RE
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    Some(HopReply {
        rating,
        signal,
        expansions,
        concerns,
        summary,
    })
}

/// Parse a synthesis reply; `None` means malformed (no summary line).
pub fn parse_synthesis_reply(raw: &str) -> Option<SynthesisReply> {
    let cleaned = strip_think(raw);

    let summary = SUMMARY_RE
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())?;

    let confidence = CONFIDENCE_RE
        .captures(&cleaned)
        .and_then(|c| c.get(1)?.as_str().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0));

    let rating = RATING_RE
        .captures(&cleaned)
        .and_then(|c| Tier::parse(c.get(1)?.as_str()));

    let categories = CATEGORY_RE
        .captures_iter(&cleaned)
        .filter_map(|c| {
            Some((
                c.get(1)?.as_str().to_string(),
                c.get(2)?.as_str().parse::<f32>().ok()?.clamp(0.0, 1.0),
            ))
        })
        .collect();

    Some(SynthesisReply {
        summary,
        confidence,
        rating,
        categories,
    })
}

/// Deterministic early-exit scan over a hop-1 response.
///
/// Returns the stop signal the response *permits*: `stop_high` when a
/// severity marker appears; `stop_low` when at least two calm markers
/// appear and Phase 1 already rated the change LOW.
pub fn early_exit_permit(raw: &str, phase1_tier: Tier) -> Option<StopSignal> {
    let lower = raw.to_ascii_lowercase();
    if STOP_HIGH_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(StopSignal::StopHigh);
    }
    let calm_hits = STOP_LOW_MARKERS
        .iter()
        .filter(|m| lower.contains(*m))
        .count();
    if calm_hits >= 2 && phase1_tier == Tier::Low {
        return Some(StopSignal::StopLow);
    }
    None
}

fn signal_from_str(s: &str) -> Option<StopSignal> {
    match s.to_ascii_lowercase().as_str() {
        "continue" => Some(StopSignal::Continue),
        "stop_low" => Some(StopSignal::StopLow),
        "stop_high" => Some(StopSignal::StopHigh),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOP: &str = "\
RATING: high
SIGNAL: continue
EXPAND: cochange file:src/db.rs
EXPAND: imports file:src/db.rs
CONCERN: 0.8 file:src/db.rs frequent co-change partner with incident history
CONCERN: 0.5 dev:alice single owner recently departed
SUMMARY: The change touches a hub file with recent incidents.
";

    #[test]
    fn parses_complete_hop_reply() {
        let reply = parse_hop_reply(HOP).unwrap();
        assert_eq!(reply.rating, Tier::High);
        assert_eq!(reply.signal, StopSignal::Continue);
        assert_eq!(reply.expansions.len(), 2);
        assert_eq!(reply.expansions[0].0, "cochange");
        assert_eq!(reply.concerns.len(), 2);
        assert!((reply.concerns[0].importance - 0.8).abs() < 1e-6);
        assert_eq!(reply.concerns[0].node_id, "file:src/db.rs");
        assert!(reply.summary.is_some());
    }

    #[test]
    fn missing_required_lines_is_malformed() {
        assert!(parse_hop_reply("SUMMARY: no rating line").is_none());
        assert!(parse_hop_reply("RATING: high\nno signal").is_none());
        assert!(parse_hop_reply("RATING: enormous\nSIGNAL: continue").is_none());
    }

    #[test]
    fn think_tags_are_stripped_before_parsing() {
        let raw = "<think>RATING: critical is tempting…</think>\nRATING: low\nSIGNAL: stop_low\n";
        let reply = parse_hop_reply(raw).unwrap();
        assert_eq!(reply.rating, Tier::Low);
        assert_eq!(reply.signal, StopSignal::StopLow);
    }

    #[test]
    fn parses_synthesis_reply() {
        let raw = "\
SUMMARY: High coupling and two recent incidents make this risky. Review before commit.
CONFIDENCE: 0.85
RATING: high
CATEGORY: incidents 0.9
CATEGORY: co_change 0.7
";
        let reply = parse_synthesis_reply(raw).unwrap();
        assert!(reply.summary.starts_with("High coupling"));
        assert_eq!(reply.confidence, Some(0.85));
        assert_eq!(reply.rating, Some(Tier::High));
        assert_eq!(reply.categories.len(), 2);
    }

    #[test]
    fn synthesis_without_summary_is_malformed() {
        assert!(parse_synthesis_reply("CONFIDENCE: 0.4").is_none());
    }

    #[test]
    fn early_exit_markers() {
        assert_eq!(
            early_exit_permit("this is a severe regression", Tier::High),
            Some(StopSignal::StopHigh)
        );
        assert_eq!(
            early_exit_permit("minimal impact, safe to merge", Tier::Low),
            Some(StopSignal::StopLow)
        );
        // Calm markers without a LOW phase-1 tier do not permit stop_low.
        assert_eq!(
            early_exit_permit("minimal impact, safe to merge", Tier::Medium),
            None
        );
        assert_eq!(early_exit_permit("looks fine overall", Tier::Low), None);
    }
}
