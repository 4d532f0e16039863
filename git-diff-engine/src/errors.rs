//! Error hierarchy for git-diff-engine.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Callers can distinguish "not a repository" and "no changes" from
//!   transport-level git failures without string matching.
//! - Ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type DiffResult<T> = Result<T, Error>;

/// Root error type for the git-diff-engine crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The given path is not inside a git working tree.
    #[error("not a git repository: {0}")]
    NotARepository(String),

    /// The working tree has no changes against the comparison base.
    #[error("no changes against {base_ref}")]
    NoChanges { base_ref: String },

    /// A git subprocess could not be spawned or exited non-zero.
    #[error(transparent)]
    Git(#[from] GitCommandError),

    /// Unified diff parsing failure.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure of a `git` subprocess invocation.
#[derive(Debug, Error)]
pub enum GitCommandError {
    /// The process could not be spawned (binary missing, permissions).
    #[error("failed to run git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but exited with a non-zero status.
    #[error("git {args} exited with {code:?}: {stderr}")]
    NonZero {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Output was not valid UTF-8.
    #[error("git {args} produced non-UTF-8 output")]
    NonUtf8 { args: String },
}

/// Unified diff parser errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid hunk header: {0}")]
    InvalidHunkHeader(String),

    #[error("file header without a usable path: {0}")]
    MissingPath(String),
}
