//! Phase-0 classifier: deterministic, I/O-free triage of the diff.
//!
//! Rules are applied in spec order; the first one that matches wins:
//! docs-only, risky config, security indicators, tests-only, structural,
//! interface, behavioral. When both same-precedence force-escalating
//! rules (config and security) fire across different files, the diff
//! aggregates to `Mixed` carrying the union of their flags and the
//! highest tier floor.
//!
//! The classifier is a pure function of the diff: identical input yields
//! identical output, which Phase-0 determinism tests pin down.

pub mod patterns;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use git_diff_engine::{Diff, FileChange};

use crate::config::ClassifierConfig;
use crate::model::{Classification, ModificationType, Tier};

lazy_static! {
    /// Fallback used when a configured risky-key regex fails to compile.
    static ref NEVER_MATCH: Regex = Regex::new(r"\zX").expect("static regex");
}

/// Classify the diff. Pure; completes in well under 50 ms for diffs in
/// the thousands of lines.
pub fn classify(diff: &Diff, cfg: &ClassifierConfig) -> Classification {
    let mut matched_rules: Vec<String> = Vec::new();

    // Rule 1: documentation-only.
    if diff.files.iter().all(is_docs_only_file) {
        matched_rules.push("docs_only:all files match documentation patterns".to_string());
        return finish(ModificationType::DocsOnly, matched_rules);
    }

    let risky_keys: Vec<Regex> = cfg
        .risky_config_keys
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|_| NEVER_MATCH.clone()))
        .collect();

    // Per-file force-escalating rules (2 and 3), collected for aggregation.
    let mut config_hits = Vec::new();
    let mut security_hits = Vec::new();
    for file in &diff.files {
        if let Some(hit) = risky_config_hit(file, &risky_keys) {
            config_hits.push(hit);
            continue;
        }
        if let Some(hit) = security_indicator_hit(file, cfg) {
            security_hits.push(hit);
        }
    }
    matched_rules.extend(config_hits.iter().cloned());
    matched_rules.extend(security_hits.iter().cloned());

    match (config_hits.is_empty(), security_hits.is_empty()) {
        (false, false) => {
            return finish_mixed(
                &[ModificationType::Config, ModificationType::Security],
                matched_rules,
            );
        }
        (false, true) => return finish(ModificationType::Config, matched_rules),
        (true, false) => return finish(ModificationType::Security, matched_rules),
        (true, true) => {}
    }

    // Rule 4: only test files changed.
    if diff.files.iter().all(|f| patterns::is_test_path(&f.path)) {
        matched_rules.push("tests_only:only test files modified".to_string());
        return finish(ModificationType::TestsOnly, matched_rules);
    }

    // Rule 5: renames, whitespace, comments, import reorderings.
    if diff.files.iter().all(patterns::is_trivial_change) {
        matched_rules.push("structural:renames/whitespace/comments/imports only".to_string());
        return finish(ModificationType::Structural, matched_rules);
    }

    // Rule 6: a public interface is altered.
    let interface_hits: Vec<String> = diff.files.iter().filter_map(interface_hit).collect();
    if !interface_hits.is_empty() {
        matched_rules.extend(interface_hits);
        return finish(ModificationType::Interface, matched_rules);
    }

    // Rule 7: default.
    finish(ModificationType::Behavioral, matched_rules)
}

fn finish(ty: ModificationType, matched_rules: Vec<String>) -> Classification {
    let (force_escalate, skip_phase2, tier_floor) = ty.default_flags();
    let c = Classification {
        modification_type: ty,
        force_escalate,
        skip_phase2,
        tier_floor,
        matched_rules,
    };
    debug!(
        "phase0: type={} force={} skip2={} floor={}",
        ty.as_str(),
        c.force_escalate,
        c.skip_phase2,
        c.tier_floor
    );
    c
}

/// Aggregate several escalating types: union of flags, max floor.
fn finish_mixed(hits: &[ModificationType], matched_rules: Vec<String>) -> Classification {
    let mut force = false;
    let mut skip = true;
    let mut floor = Tier::Low;
    for ty in hits {
        let (f, s, t) = ty.default_flags();
        force |= f;
        skip &= s;
        floor = floor.max(t);
    }
    let c = Classification {
        modification_type: ModificationType::Mixed,
        force_escalate: force,
        skip_phase2: skip,
        tier_floor: floor,
        matched_rules,
    };
    debug!(
        "phase0: type=mixed({} rules) force={} floor={}",
        c.matched_rules.len(),
        c.force_escalate,
        c.tier_floor
    );
    c
}

/// Docs path carrying no code hunks (binary "docs" don't count).
fn is_docs_only_file(file: &FileChange) -> bool {
    patterns::is_docs_path(&file.path) && !file.binary
}

/// Rule 2: config file touching a risky key.
fn risky_config_hit(file: &FileChange, risky_keys: &[Regex]) -> Option<String> {
    if !patterns::is_config_path(&file.path) {
        return None;
    }
    for line in file.added_line_contents().chain(file.removed_line_contents()) {
        for re in risky_keys {
            if re.is_match(line) {
                let key = line.split(['=', ':']).next().unwrap_or(line).trim();
                return Some(format!("config:{} key {}", file.path, key));
            }
        }
    }
    None
}

/// Rule 3: security indicators in the path or added hunks.
fn security_indicator_hit(file: &FileChange, cfg: &ClassifierConfig) -> Option<String> {
    let lower = file.path.to_ascii_lowercase();
    for kw in &cfg.security_keywords {
        if lower.contains(kw.as_str()) {
            return Some(format!("security:{} path keyword {kw}", file.path));
        }
    }
    for line in file.added_line_contents() {
        if let Some(what) = patterns::security_hit(line, &cfg.security_keywords) {
            return Some(format!("security:{} {what}", file.path));
        }
    }
    None
}

/// Rule 6: a public interface is altered. Removed exported signatures and
/// schema-file edits count; pure additions do not.
fn interface_hit(file: &FileChange) -> Option<String> {
    if patterns::is_schema_path(&file.path) {
        return Some(format!("interface:{} schema file changed", file.path));
    }
    for line in file.removed_line_contents() {
        if patterns::is_interface_line(line) {
            return Some(format!(
                "interface:{} exported signature altered",
                file.path
            ));
        }
    }
    None
}
