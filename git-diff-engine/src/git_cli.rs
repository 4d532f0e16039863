//! Thin async wrapper over the `git` CLI.
//!
//! All repository reads go through subprocess invocations; nothing links
//! against libgit2. Output is captured fully (diffs for typical change
//! sets are small; oversized ones are handled upstream by a soft limit).

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::errors::{DiffResult, GitCommandError};

/// Run `git <args>` inside `repo_root` and return stdout as UTF-8.
pub async fn run_git(repo_root: &Path, args: &[&str]) -> DiffResult<String> {
    let rendered = args.join(" ");
    debug!("git {rendered} (cwd={})", repo_root.display());

    let output = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .await
        .map_err(|source| GitCommandError::Spawn {
            args: rendered.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(GitCommandError::NonZero {
            args: rendered,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    String::from_utf8(output.stdout)
        .map_err(|_| GitCommandError::NonUtf8 { args: rendered }.into())
}

/// True when `repo_root` is inside a git working tree.
pub async fn is_work_tree(repo_root: &Path) -> bool {
    matches!(
        run_git(repo_root, &["rev-parse", "--is-inside-work-tree"]).await,
        Ok(out) if out.trim() == "true"
    )
}

/// Resolve a reference to a full commit id.
pub async fn rev_parse(repo_root: &Path, reference: &str) -> DiffResult<String> {
    let out = run_git(repo_root, &["rev-parse", reference]).await?;
    Ok(out.trim().to_string())
}
