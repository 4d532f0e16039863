//! Local git diff extraction for the risk pipeline.
//!
//! Single high-level entry: [`extract`] takes a working-tree path and a
//! comparison base and returns a canonical [`Diff`]:
//!
//! 1. Validate the repository and resolve `HEAD` (`git rev-parse`).
//! 2. Capture the patch (`git diff -M80% --no-color`, optionally
//!    `--cached` for staged-only runs). Rename detection is enabled at the
//!    80% similarity threshold; pairs below it surface as delete + add.
//! 3. Parse the unified diff into typed [`FileChange`] records with
//!    POSIX-normalized, repository-relative paths. Binary files keep a
//!    marker and no hunks.
//!
//! The extractor has no side effects and never writes to the repository.

pub mod errors;
pub mod git_cli;
pub mod parser;
pub mod types;

use std::path::Path;

use tracing::debug;

use errors::{DiffResult, Error};
pub use types::{ChangeType, Diff, DiffHunk, DiffLine, FileChange, Language};

/// Options for [`extract`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Comparison base; defaults to `HEAD`.
    pub base_ref: String,
    /// Restrict the diff to the index (staged changes) only.
    pub staged_only: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            base_ref: "HEAD".to_string(),
            staged_only: false,
        }
    }
}

/// Extract the current change set of `repo_root` against `opts.base_ref`.
///
/// # Errors
/// - [`Error::NotARepository`] when the path is not a git working tree.
/// - [`Error::NoChanges`] when the diff is empty.
/// - [`Error::Git`] / [`Error::Parse`] on subprocess or patch failures.
pub async fn extract(repo_root: &Path, opts: &ExtractOptions) -> DiffResult<Diff> {
    if !git_cli::is_work_tree(repo_root).await {
        return Err(Error::NotARepository(repo_root.display().to_string()));
    }

    let head_commit = git_cli::rev_parse(repo_root, "HEAD")
        .await
        .map_err(|_| Error::NotARepository(format!("{} (unborn HEAD)", repo_root.display())))?;
    debug!("extract: head={head_commit} base={}", opts.base_ref);

    let mut args = vec!["diff", "-M80%", "--no-color", "--no-ext-diff"];
    if opts.staged_only {
        args.push("--cached");
    }
    args.push(opts.base_ref.as_str());

    let patch = git_cli::run_git(repo_root, &args).await?;
    if patch.trim().is_empty() {
        return Err(Error::NoChanges {
            base_ref: opts.base_ref.clone(),
        });
    }

    let files = parser::parse_patch(&patch)?;
    if files.is_empty() {
        return Err(Error::NoChanges {
            base_ref: opts.base_ref.clone(),
        });
    }

    debug!(
        "extract: files={} changed_lines={}",
        files.len(),
        files.iter().map(|f| f.added_lines + f.removed_lines).sum::<u32>()
    );

    Ok(Diff {
        head_commit,
        base_ref: opts.base_ref.clone(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .is_ok_and(|ok| ok)
    }

    fn git_in(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "t")
            .env("GIT_AUTHOR_EMAIL", "t@example.com")
            .env("GIT_COMMITTER_NAME", "t")
            .env("GIT_COMMITTER_EMAIL", "t@example.com")
            .status()
            .expect("git spawn");
        assert!(status.success(), "git {args:?} failed");
    }

    #[tokio::test]
    async fn extract_reports_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract(dir.path(), &ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotARepository(_)));
    }

    #[tokio::test]
    async fn extract_reads_working_tree_changes() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git_in(root, &["init", "-q"]);
        std::fs::write(root.join("main.rs"), "fn main() {}\n").unwrap();
        git_in(root, &["add", "."]);
        git_in(root, &["commit", "-q", "-m", "init"]);

        std::fs::write(root.join("main.rs"), "fn main() { println!(\"hi\"); }\n").unwrap();

        let diff = extract(root, &ExtractOptions::default()).await.unwrap();
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].path, "main.rs");
        assert_eq!(diff.files[0].change_type, ChangeType::Modify);
        assert!(diff.files[0].added_lines >= 1);
        assert!(!diff.head_commit.is_empty());
    }

    #[tokio::test]
    async fn extract_reports_no_changes_on_clean_tree() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git_in(root, &["init", "-q"]);
        std::fs::write(root.join("a.txt"), "a\n").unwrap();
        git_in(root, &["add", "."]);
        git_in(root, &["commit", "-q", "-m", "init"]);

        let err = extract(root, &ExtractOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NoChanges { .. }));
    }
}
