//! Best-effort assessment telemetry (JSON on disk).
//!
//! One row per assessment, written under the configured telemetry dir.
//! Nothing here is required for correctness: failures are logged and
//! swallowed, and the stores the gateway reads stay untouched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use git_diff_engine::Diff;

use crate::model::{Investigation, RiskAssessment};

/// Persisted row schema.
#[derive(Debug, Serialize)]
struct TelemetryRow<'a> {
    id: &'a str,
    created_at: String,
    diff_digest: String,
    phase0_tag: &'a str,
    phase1_tier: &'a str,
    phase2_tier: Option<&'a str>,
    final_tier: &'a str,
    hops: usize,
    tokens_used: u64,
    elapsed_ms: u64,
}

/// Stable digest of a diff: head, base, and per-file change shape.
pub fn diff_digest(diff: &Diff) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&diff.head_commit);
    hasher.update(&diff.base_ref);
    for f in &diff.files {
        hasher.update(&f.path);
        hasher.update(f.added_lines.to_le_bytes());
        hasher.update(f.removed_lines.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Write one telemetry row. Best-effort: errors become warnings.
pub fn record(
    dir: &Path,
    diff: &Diff,
    assessment: &RiskAssessment,
    investigation: Option<&Investigation>,
) {
    let digest = diff_digest(diff);
    let fallback_id = format!("assess-{digest}");
    let id = assessment.investigation_id.as_deref().unwrap_or(&fallback_id);

    let row = TelemetryRow {
        id,
        created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        diff_digest: digest,
        phase0_tag: assessment.phase0_tag.as_str(),
        phase1_tier: assessment.phase1_tier.as_str(),
        phase2_tier: assessment.phase2_tier.map(|t| t.as_str()),
        final_tier: assessment.tier.as_str(),
        hops: investigation.map_or(0, |i| i.hops.len()),
        tokens_used: investigation.map_or(0, |i| i.total_tokens),
        elapsed_ms: assessment.elapsed_ms,
    };

    if let Err(e) = write_row(dir, id, &row) {
        warn!("telemetry: failed to write row: {e}");
    }
}

fn write_row(dir: &Path, id: &str, row: &TelemetryRow<'_>) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let path: PathBuf = dir.join(format!("{id}.json"));
    let data = serde_json::to_vec_pretty(row).unwrap_or_else(|_| b"{}".to_vec());
    fs::write(&path, data)?;
    info!("telemetry: row written → {}", path.display());
    Ok(())
}
