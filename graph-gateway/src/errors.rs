//! Error types for the graph gateway.
//!
//! The degradation contract lives here: every query can fail with
//! [`GatewayError::Unavailable`], which callers must treat as "signal
//! absent", never as "signal zero". Only [`GatewayError::SchemaMismatch`]
//! is fatal to an assessment.

use thiserror::Error;

/// Convenient alias for gateway results.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Which of the three backing stores produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// In-memory graph snapshot (ingester export).
    Graph,
    /// SQLite metadata/incident store.
    Relational,
    /// In-process metric cache.
    Cache,
}

/// Root error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A store could not serve the query. Callers clamp the signal to its
    /// neutral prior and lower confidence; they never fail the assessment.
    #[error("{store:?} store unavailable: {reason}")]
    Unavailable { store: StoreKind, reason: String },

    /// The ingester snapshot declares a schema this build does not
    /// understand. Fatal: the assessment is refused.
    #[error("snapshot schema version {found} not supported (supported: {supported})")]
    SchemaMismatch { found: u32, supported: u32 },

    /// Snapshot files exist but could not be decoded.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl GatewayError {
    /// Shorthand for a per-query unavailability.
    pub fn unavailable(store: StoreKind, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            store,
            reason: reason.into(),
        }
    }

    /// True when the error degrades (vs. refusing the assessment).
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
