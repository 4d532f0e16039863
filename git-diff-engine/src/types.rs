//! Canonical diff model shared by the whole pipeline.
//!
//! A [`Diff`] is immutable for the duration of one assessment: it captures
//! the working-tree (or staged) change set against a base reference, with
//! repository-relative POSIX paths.

use serde::{Deserialize, Serialize};

/// The whole change set of one assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diff {
    /// Commit id of `HEAD` at extraction time.
    pub head_commit: String,
    /// The comparison base the diff was taken against (e.g. `HEAD`).
    pub base_ref: String,
    /// Per-file changes, in the order git reported them.
    pub files: Vec<FileChange>,
}

impl Diff {
    /// Total count of changed (added + removed) lines across all files.
    pub fn total_changed_lines(&self) -> u32 {
        self.files
            .iter()
            .map(|f| f.added_lines + f.removed_lines)
            .sum()
    }

    /// True when the change set exceeds the soft line limit.
    ///
    /// An oversized diff is reported, not fatal: the pipeline still runs,
    /// but the expensive investigation phase is disabled.
    pub fn oversized(&self, limit: u32) -> bool {
        self.total_changed_lines() > limit
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths of all changed files (post-change side for renames).
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }
}

/// One changed file within a [`Diff`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative POSIX path (post-change side).
    pub path: String,
    /// Kind of change.
    pub change_type: ChangeType,
    /// Added line count (0 for binary files).
    pub added_lines: u32,
    /// Removed line count (0 for binary files).
    pub removed_lines: u32,
    /// Parsed hunks; empty for binary files.
    pub hunks: Vec<DiffHunk>,
    /// Language inferred from the path extension.
    pub language: Language,
    /// True when git reported a binary patch; hunks are elided.
    pub binary: bool,
}

impl FileChange {
    /// All added line contents across hunks.
    pub fn added_line_contents(&self) -> impl Iterator<Item = &str> {
        self.hunks.iter().flat_map(|h| {
            h.lines.iter().filter_map(|l| match l {
                DiffLine::Added { content, .. } => Some(content.as_str()),
                _ => None,
            })
        })
    }

    /// All removed line contents across hunks.
    pub fn removed_line_contents(&self) -> impl Iterator<Item = &str> {
        self.hunks.iter().flat_map(|h| {
            h.lines.iter().filter_map(|l| match l {
                DiffLine::Removed { content, .. } => Some(content.as_str()),
                _ => None,
            })
        })
    }
}

/// Kind of a file change.
///
/// Git reports a rename only above its similarity threshold (the extractor
/// asks for 80%); below it the pair shows up as `Delete` + `Add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Rename {
        /// Pre-change path.
        from: String,
    },
}

/// One `@@`-delimited hunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

/// One classified diff line with its position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffLine {
    Added { new_line: u32, content: String },
    Removed { old_line: u32, content: String },
    Context { old_line: u32, new_line: u32, content: String },
}

/// Coarse language tag derived from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Kotlin,
    Dart,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Shell,
    Sql,
    Yaml,
    Toml,
    Json,
    Markdown,
    Other,
}

impl Language {
    /// Infer the language from a repository-relative path.
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit('.').next().unwrap_or("");
        match ext {
            "rs" => Self::Rust,
            "py" => Self::Python,
            "js" | "mjs" | "cjs" | "jsx" => Self::JavaScript,
            "ts" | "tsx" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "kt" | "kts" => Self::Kotlin,
            "dart" => Self::Dart,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" => Self::Cpp,
            "cs" => Self::CSharp,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "sh" | "bash" | "zsh" => Self::Shell,
            "sql" => Self::Sql,
            "yaml" | "yml" => Self::Yaml,
            "toml" => Self::Toml,
            "json" => Self::Json,
            "md" | "rst" | "markdown" => Self::Markdown,
            _ => Self::Other,
        }
    }

    /// True for languages that hold executable code (used to tell code
    /// hunks apart from docs/config edits).
    pub fn is_code(self) -> bool {
        !matches!(
            self,
            Self::Yaml | Self::Toml | Self::Json | Self::Markdown | Self::Other
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_path_covers_common_extensions() {
        assert_eq!(Language::from_path("src/lib.rs"), Language::Rust);
        assert_eq!(Language::from_path("a/b/app.py"), Language::Python);
        assert_eq!(Language::from_path("deploy/k8s.yaml"), Language::Yaml);
        assert_eq!(Language::from_path("README.md"), Language::Markdown);
        assert_eq!(Language::from_path("Makefile"), Language::Other);
    }

    #[test]
    fn oversized_uses_total_changed_lines() {
        let diff = Diff {
            head_commit: "abc".into(),
            base_ref: "HEAD".into(),
            files: vec![FileChange {
                path: "big.rs".into(),
                change_type: ChangeType::Modify,
                added_lines: 7_000,
                removed_lines: 4_000,
                hunks: vec![],
                language: Language::Rust,
                binary: false,
            }],
        };
        assert!(diff.oversized(10_000));
        assert!(!diff.oversized(20_000));
    }
}
