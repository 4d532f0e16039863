//! Pipeline policy configuration.
//!
//! Weights, thresholds, and budgets are configuration, not constants: one
//! [`PolicyConfig`] is threaded through the orchestrator into every phase.
//! Loading is env-driven and intentionally tolerant — unknown variables
//! are ignored and parse failures fall back to defaults — followed by a
//! `validate()` pass that keeps the numbers coherent.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::Budget;

/// Version of the Phase-1 scoring formula; part of every metric cache key.
pub const METRIC_ALGO_VERSION: u32 = 1;

/// Phase-1 weights and tier thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase1Config {
    pub weight_coupling: f32,
    pub weight_co_change: f32,
    pub weight_incident: f32,
    pub weight_ownership: f32,
    pub weight_test: f32,
    /// Importer count at which coupling saturates to 1.0.
    pub coupling_saturation: f32,
    /// Frequency floor passed to the co-change query.
    pub co_change_floor: f32,
    pub threshold_medium: f32,
    pub threshold_high: f32,
    pub threshold_critical: f32,
}

impl Default for Phase1Config {
    fn default() -> Self {
        Self {
            weight_coupling: 0.30,
            weight_co_change: 0.25,
            weight_incident: 0.20,
            weight_ownership: 0.15,
            weight_test: 0.10,
            coupling_saturation: 10.0,
            co_change_floor: 0.5,
            threshold_medium: 0.25,
            threshold_high: 0.55,
            threshold_critical: 0.80,
        }
    }
}

/// Phase-0 pattern lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Regexes matched against config keys/lines; a hit marks the change
    /// as risky configuration.
    pub risky_config_keys: Vec<String>,
    /// Keywords indicating security-sensitive code.
    pub security_keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            risky_config_keys: vec![
                r"(?i)auth".to_string(),
                r"(?i)secret".to_string(),
                r"(?i)password".to_string(),
                r"(?i)token".to_string(),
                r"(?i)key".to_string(),
                r"(?i)endpoint".to_string(),
                r"(?i)database_url".to_string(),
                r"(?i)timeout".to_string(),
                r"(?i)replicas".to_string(),
            ],
            security_keywords: vec![
                "password".to_string(),
                "token".to_string(),
                "secret".to_string(),
                "jwt".to_string(),
                "oauth".to_string(),
                "auth".to_string(),
                "crypto".to_string(),
            ],
        }
    }
}

/// Everything the orchestrator needs to run one assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub phase1: Phase1Config,
    pub budget: Budget,
    pub classifier: ClassifierConfig,
    /// Global wall-clock limit in ms (default run).
    pub global_timeout_ms: u64,
    /// Global wall-clock limit in ms for `--deep` runs.
    pub deep_timeout_ms: u64,
    /// Phase-1 sub-budget in ms.
    pub phase1_timeout_ms: u64,
    /// Soft line limit above which Phase 2 is disabled.
    pub large_diff_line_limit: u32,
    /// Where assessment telemetry reports land; `None` disables them.
    pub telemetry_dir: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            phase1: Phase1Config::default(),
            budget: Budget::default(),
            classifier: ClassifierConfig::default(),
            global_timeout_ms: 5_000,
            deep_timeout_ms: 30_000,
            phase1_timeout_ms: 2_000,
            large_diff_line_limit: 10_000,
            telemetry_dir: None,
        }
    }
}

impl PolicyConfig {
    /// Load from environment variables or fall back to defaults.
    ///
    /// Supported vars (all optional):
    /// - `PHASE1_WEIGHTS` — five comma-separated floats:
    ///   coupling,co_change,incident,ownership,test
    /// - `PHASE1_TIER_THRESHOLDS` — three floats: medium,high,critical
    /// - `PHASE2_MAX_TOKENS`, `PHASE2_MAX_HOPS`, `PHASE2_MAX_LATENCY_MS`,
    ///   `PHASE2_MAX_COST_CENTS`
    /// - `CLASSIFIER_RISKY_KEYS`, `CLASSIFIER_SECURITY_KEYWORDS`
    ///   (comma-separated)
    /// - `RISK_GLOBAL_TIMEOUT_MS`, `RISK_DEEP_TIMEOUT_MS`,
    ///   `RISK_PHASE1_TIMEOUT_MS`, `RISK_LARGE_DIFF_LINES`
    /// - `RISK_TELEMETRY_DIR`
    pub fn load_from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Some(w) = env_f32_list("PHASE1_WEIGHTS") {
            if w.len() == 5 {
                cfg.phase1.weight_coupling = w[0];
                cfg.phase1.weight_co_change = w[1];
                cfg.phase1.weight_incident = w[2];
                cfg.phase1.weight_ownership = w[3];
                cfg.phase1.weight_test = w[4];
            }
        }
        if let Some(t) = env_f32_list("PHASE1_TIER_THRESHOLDS") {
            if t.len() == 3 {
                cfg.phase1.threshold_medium = t[0];
                cfg.phase1.threshold_high = t[1];
                cfg.phase1.threshold_critical = t[2];
            }
        }

        if let Some(v) = env_u64("PHASE2_MAX_TOKENS") {
            cfg.budget.max_tokens = v;
        }
        if let Some(v) = env_u64("PHASE2_MAX_HOPS") {
            cfg.budget.max_hops = v.min(3) as u8;
        }
        if let Some(v) = env_u64("PHASE2_MAX_LATENCY_MS") {
            cfg.budget.max_latency_ms = v;
        }
        if let Some(v) = env_f32("PHASE2_MAX_COST_CENTS") {
            cfg.budget.max_cost_cents = v;
        }

        if let Some(list) = env_list("CLASSIFIER_RISKY_KEYS") {
            cfg.classifier.risky_config_keys = list;
        }
        if let Some(list) = env_list("CLASSIFIER_SECURITY_KEYWORDS") {
            cfg.classifier.security_keywords = list;
        }

        if let Some(v) = env_u64("RISK_GLOBAL_TIMEOUT_MS") {
            cfg.global_timeout_ms = v;
        }
        if let Some(v) = env_u64("RISK_DEEP_TIMEOUT_MS") {
            cfg.deep_timeout_ms = v;
        }
        if let Some(v) = env_u64("RISK_PHASE1_TIMEOUT_MS") {
            cfg.phase1_timeout_ms = v;
        }
        if let Some(v) = env_u64("RISK_LARGE_DIFF_LINES") {
            cfg.large_diff_line_limit = v as u32;
        }
        if let Ok(dir) = std::env::var("RISK_TELEMETRY_DIR") {
            if !dir.trim().is_empty() {
                cfg.telemetry_dir = Some(PathBuf::from(dir));
            }
        }

        cfg.validate()
    }

    /// Repair incoherent values instead of failing startup.
    pub fn validate(mut self) -> Self {
        let p = &mut self.phase1;
        let weight_sum = p.weight_coupling
            + p.weight_co_change
            + p.weight_incident
            + p.weight_ownership
            + p.weight_test;
        if weight_sum <= 0.0 || !weight_sum.is_finite() {
            *p = Phase1Config::default();
        }
        if !(p.threshold_medium < p.threshold_high && p.threshold_high < p.threshold_critical) {
            let d = Phase1Config::default();
            p.threshold_medium = d.threshold_medium;
            p.threshold_high = d.threshold_high;
            p.threshold_critical = d.threshold_critical;
        }
        if p.coupling_saturation <= 0.0 {
            p.coupling_saturation = 10.0;
        }

        if self.budget.max_hops == 0 || self.budget.max_hops > 3 {
            self.budget.max_hops = 3;
        }
        if self.global_timeout_ms == 0 {
            self.global_timeout_ms = 5_000;
        }
        if self.phase1_timeout_ms == 0 {
            self.phase1_timeout_ms = 2_000;
        }
        self
    }

    /// The wall-clock limit for this run.
    pub fn timeout_ms(&self, deep: bool) -> u64 {
        if deep {
            self.deep_timeout_ms
        } else {
            self.global_timeout_ms
        }
    }
}

/* ------------------------- ENV helpers ------------------------- */

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_f32(key: &str) -> Option<f32> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<f32>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let list: Vec<String> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    (!list.is_empty()).then_some(list)
}

fn env_f32_list(key: &str) -> Option<Vec<f32>> {
    let list = env_list(key)?;
    list.iter()
        .map(|s| s.parse::<f32>().ok())
        .collect::<Option<Vec<f32>>>()
}
