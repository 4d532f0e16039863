//! Gateway configuration.
//!
//! Loaded from environment variables with tolerant parsing: unknown
//! variables are ignored and parse failures fall back to defaults, then a
//! basic `validate()` keeps the values sane.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Snapshot schema version this build understands.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Configuration for opening a [`crate::GraphGateway`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Directory holding the ingester export (`manifest.json`,
    /// `nodes.jsonl`, `edges.jsonl`) and `incidents.db`.
    pub data_dir: PathBuf,
    /// Per-query timeout in milliseconds.
    pub query_timeout_ms: u64,
    /// Concurrent read permits (sized to storage's read concurrency).
    pub read_concurrency: usize,
    /// Maximum nodes returned by one neighborhood expansion.
    pub degree_cap: usize,
    /// Incident lookback window in days.
    pub incident_window_days: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("risk_data"),
            query_timeout_ms: 500,
            read_concurrency: 8,
            degree_cap: 200,
            incident_window_days: 180,
        }
    }
}

impl GatewayConfig {
    /// Load from environment or fall back to defaults.
    ///
    /// Supported vars (all optional): `GATEWAY_DATA_DIR`,
    /// `GATEWAY_QUERY_TIMEOUT_MS`, `GATEWAY_READ_CONCURRENCY`,
    /// `GATEWAY_DEGREE_CAP`, `GATEWAY_INCIDENT_WINDOW_DAYS`.
    pub fn load_from_env_or_default() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("GATEWAY_DATA_DIR") {
            if !v.trim().is_empty() {
                cfg.data_dir = PathBuf::from(v);
            }
        }
        if let Some(v) = env_u64("GATEWAY_QUERY_TIMEOUT_MS") {
            cfg.query_timeout_ms = v;
        }
        if let Some(v) = env_u64("GATEWAY_READ_CONCURRENCY") {
            cfg.read_concurrency = v as usize;
        }
        if let Some(v) = env_u64("GATEWAY_DEGREE_CAP") {
            cfg.degree_cap = v as usize;
        }
        if let Some(v) = env_u64("GATEWAY_INCIDENT_WINDOW_DAYS") {
            cfg.incident_window_days = v as i64;
        }
        cfg.validate()
    }

    /// Clamp out-of-range values back to sane defaults.
    pub fn validate(mut self) -> Self {
        if self.query_timeout_ms == 0 {
            self.query_timeout_ms = 500;
        }
        if self.read_concurrency == 0 {
            self.read_concurrency = 8;
        }
        if self.degree_cap == 0 {
            self.degree_cap = 200;
        }
        if self.incident_window_days <= 0 {
            self.incident_window_days = 180;
        }
        self
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("manifest.json")
    }

    pub fn nodes_path(&self) -> PathBuf {
        self.data_dir.join("nodes.jsonl")
    }

    pub fn edges_path(&self) -> PathBuf {
        self.data_dir.join("edges.jsonl")
    }

    pub fn incidents_db_path(&self) -> PathBuf {
        self.data_dir.join("incidents.db")
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
}
