//! Core data model of the risk pipeline.
//!
//! Tiers order naturally (`Low < Medium < High < Critical`), which is what
//! the monotone-escalation rule leans on: later phases may only `max` the
//! tier, never lower it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use graph_gateway::NodeId;

/// Risk tier. Ordering is part of the contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Low,
    Medium,
    High,
    Critical,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a tier word case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modification type assigned by the Phase-0 classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    DocsOnly,
    Config,
    TestsOnly,
    Structural,
    Behavioral,
    Interface,
    Security,
    Performance,
    Mixed,
}

impl ModificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocsOnly => "docs_only",
            Self::Config => "config",
            Self::TestsOnly => "tests_only",
            Self::Structural => "structural",
            Self::Behavioral => "behavioral",
            Self::Interface => "interface",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Mixed => "mixed",
        }
    }

    /// Built-in `(force_escalate, skip_phase2, tier_floor)` per type.
    pub fn default_flags(self) -> (bool, bool, Tier) {
        match self {
            Self::DocsOnly => (false, true, Tier::Low),
            Self::Config => (true, false, Tier::High),
            Self::TestsOnly => (false, true, Tier::Low),
            Self::Structural => (false, false, Tier::Low),
            Self::Behavioral => (false, false, Tier::Low),
            Self::Interface => (true, false, Tier::Medium),
            Self::Security => (true, false, Tier::High),
            Self::Performance => (false, false, Tier::Low),
            Self::Mixed => (false, false, Tier::Low),
        }
    }
}

/// Full Phase-0 output: type, flags, floor, and the rules that fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub modification_type: ModificationType,
    pub force_escalate: bool,
    pub skip_phase2: bool,
    pub tier_floor: Tier,
    /// Human-readable rule hits, e.g. `config:.env.production key DATABASE_URL`.
    pub matched_rules: Vec<String>,
}

/// Per-file baseline metrics (Phase 1).
///
/// All score components live in [0,1]. `unavailable_signals` counts inputs
/// that had to be clamped to their neutral prior because a store could not
/// answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub path: String,
    pub coupling_score: f32,
    pub co_change_frequency: f32,
    /// Strongest co-change partner, kept for evidence citation.
    pub top_co_change_partner: Option<String>,
    pub ownership_churn: f32,
    pub test_ratio: f32,
    pub incident_count: u32,
    pub incident_score: f32,
    pub unavailable_signals: u8,
    pub file_score: f32,
}

/// Aggregated Phase-1 result.
#[derive(Debug, Clone)]
pub struct Phase1Output {
    pub per_file: Vec<BaselineMetrics>,
    pub tier: Tier,
    /// Max file score in [0,1]; basis of the fallback risk score.
    pub max_score: f32,
    /// Confidence reduction in [0,1] accumulated from clamped signals.
    pub confidence_penalty: f32,
    pub warnings: Vec<String>,
}

/// Where an evidence item came from: which gateway query, at which hop
/// (hop 0 = Phase-1 metrics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub query: String,
    pub hop: u8,
}

/// Cited evidence. A discriminated union: the kind carries meaning for
/// scoring (incident/co-change/ownership blend) and for rendering, so it
/// is never collapsed into a plain string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    CoChange {
        source_node_id: NodeId,
        weight: f32,
        human_description: String,
        provenance: Provenance,
    },
    Incident {
        source_node_id: NodeId,
        weight: f32,
        human_description: String,
        provenance: Provenance,
    },
    Ownership {
        source_node_id: NodeId,
        weight: f32,
        human_description: String,
        provenance: Provenance,
    },
    Dependency {
        source_node_id: NodeId,
        weight: f32,
        human_description: String,
        provenance: Provenance,
    },
    Structural {
        source_node_id: NodeId,
        weight: f32,
        human_description: String,
        provenance: Provenance,
    },
    Semantic {
        source_node_id: NodeId,
        weight: f32,
        human_description: String,
        provenance: Provenance,
    },
}

impl Evidence {
    pub fn source_node_id(&self) -> &NodeId {
        match self {
            Self::CoChange { source_node_id, .. }
            | Self::Incident { source_node_id, .. }
            | Self::Ownership { source_node_id, .. }
            | Self::Dependency { source_node_id, .. }
            | Self::Structural { source_node_id, .. }
            | Self::Semantic { source_node_id, .. } => source_node_id,
        }
    }

    pub fn weight(&self) -> f32 {
        match self {
            Self::CoChange { weight, .. }
            | Self::Incident { weight, .. }
            | Self::Ownership { weight, .. }
            | Self::Dependency { weight, .. }
            | Self::Structural { weight, .. }
            | Self::Semantic { weight, .. } => *weight,
        }
    }

    pub fn human_description(&self) -> &str {
        match self {
            Self::CoChange { human_description, .. }
            | Self::Incident { human_description, .. }
            | Self::Ownership { human_description, .. }
            | Self::Dependency { human_description, .. }
            | Self::Structural { human_description, .. }
            | Self::Semantic { human_description, .. } => human_description,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::CoChange { .. } => "co_change",
            Self::Incident { .. } => "incident",
            Self::Ownership { .. } => "ownership",
            Self::Dependency { .. } => "dependency",
            Self::Structural { .. } => "structural",
            Self::Semantic { .. } => "semantic",
        }
    }
}

/// Stop decision carried by a hop response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSignal {
    Continue,
    StopLow,
    StopHigh,
}

/// One completed hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopResult {
    /// 1-based hop index (1..=3).
    pub hop_index: u8,
    /// Node ids that were in the subview shown to the model.
    pub shown_nodes: Vec<NodeId>,
    /// Raw model response (post think-tag stripping).
    pub llm_response: String,
    pub tokens_used: u32,
    pub elapsed_ms: u64,
    pub signal: StopSignal,
}

/// The mutable investigation aggregate, owned by a single assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub hops: Vec<HopResult>,
    pub evidence: Vec<Evidence>,
    pub total_tokens: u64,
    pub total_elapsed_ms: u64,
    pub terminated_reason: Option<TerminatedReason>,
}

impl Investigation {
    pub fn new(id: String) -> Self {
        Self {
            id,
            hops: Vec::new(),
            evidence: Vec::new(),
            total_tokens: 0,
            total_elapsed_ms: 0,
            terminated_reason: None,
        }
    }
}

/// Why a phase ended before its natural completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatedReason {
    BudgetExhausted,
    DependencyUnavailable,
    Timeout,
    Cancelled,
}

impl TerminatedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::DependencyUnavailable => "dependency_unavailable",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Phase-2 budget. Enforced before every LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub max_tokens: u64,
    pub max_hops: u8,
    pub max_latency_ms: u64,
    pub max_cost_cents: f32,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_tokens: 10_000,
            max_hops: 3,
            max_latency_ms: 5_000,
            max_cost_cents: 5.0,
        }
    }
}

/// The single product of an assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub tier: Tier,
    /// Risk score in [0,100].
    pub score: f32,
    /// Confidence in [0,1]; 1.0 only for a fully un-degraded run.
    pub confidence: f32,
    /// At most three sentences.
    pub summary: String,
    pub per_category_scores: BTreeMap<String, f32>,
    pub citations: Vec<Evidence>,
    pub investigation_id: Option<String>,
    pub phase0_tag: ModificationType,
    pub phase1_tier: Tier,
    pub phase2_tier: Option<Tier>,
    pub terminated_reason: Option<TerminatedReason>,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

impl RiskAssessment {
    /// CLI exit code: 0 LOW/MEDIUM, 1 HIGH, 2 CRITICAL, 3 degraded.
    /// A set `terminated_reason` takes precedence over the tier mapping.
    pub fn exit_code(&self) -> i32 {
        if self.terminated_reason.is_some() {
            return 3;
        }
        match self.tier {
            Tier::Low | Tier::Medium => 0,
            Tier::High => 1,
            Tier::Critical => 2,
        }
    }
}

/// How aggressively to involve the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiMode {
    /// Never call the LLM; Phase 2 is skipped.
    Off,
    /// Phase 2 runs when escalation conditions hold.
    #[default]
    Auto,
    /// Phase 2 runs regardless of the Phase-1 tier.
    Force,
}

/// Options for one assessment.
#[derive(Debug, Clone)]
pub struct AssessOptions {
    pub base_ref: String,
    pub staged_only: bool,
    /// Raises the global wall-clock limit for thorough runs.
    pub deep: bool,
    pub ai_mode: AiMode,
    /// Include per-file metric rows in log output.
    pub explain: bool,
    /// Overrides the configured Phase-2 budget.
    pub budget: Option<Budget>,
    pub cancel: CancellationToken,
}

impl Default for AssessOptions {
    fn default() -> Self {
        Self {
            base_ref: "HEAD".to_string(),
            staged_only: false,
            deep: false,
            ai_mode: AiMode::Auto,
            explain: false,
            budget: None,
            cancel: CancellationToken::new(),
        }
    }
}
