//! Crate-wide error hierarchy for the risk pipeline.
//!
//! Propagation policy: only input problems (unreadable repository, empty
//! diff) and a snapshot schema mismatch reach the caller as failures.
//! Everything else — store outages, LLM failures, exhausted budgets —
//! degrades inside the pipeline and surfaces as `RiskAssessment` fields
//! (`confidence`, `terminated_reason`, `warnings`).

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type RiskResult<T> = Result<T, Error>;

/// Root error type: the only failures an assessment can end with.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller's input cannot be assessed at all.
    #[error(transparent)]
    Input(#[from] InputError),

    /// The graph snapshot declares an unknown schema; assessment refused.
    #[error("snapshot schema version {found} not supported (supported: {supported})")]
    SchemaMismatch { found: u32, supported: u32 },
}

/// Input validation errors. No partial result accompanies these.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("not a git repository: {0}")]
    NotARepository(String),

    #[error("no changes against {0}")]
    NoChanges(String),

    #[error("git failure: {0}")]
    Git(String),
}

impl From<git_diff_engine::errors::Error> for Error {
    fn from(e: git_diff_engine::errors::Error) -> Self {
        use git_diff_engine::errors::Error as DiffError;
        match e {
            DiffError::NotARepository(p) => Error::Input(InputError::NotARepository(p)),
            DiffError::NoChanges { base_ref } => Error::Input(InputError::NoChanges(base_ref)),
            DiffError::Git(g) => Error::Input(InputError::Git(g.to_string())),
            DiffError::Parse(p) => Error::Input(InputError::Git(p.to_string())),
        }
    }
}

/// Failure of a single planner/synthesis LLM call, after retries.
///
/// Internal to the investigator; never escapes an assessment.
#[derive(Debug, Error)]
pub enum LlmCallError {
    /// Provider unreachable or erroring.
    #[error("llm unavailable: {0}")]
    Unavailable(String),

    /// Replay script ran out of responses (treated as an outage).
    #[error("llm replay exhausted")]
    Exhausted,
}
