//! Path and content patterns used by the Phase-0 classifier.
//!
//! Everything here is pure string matching: no I/O, no allocation beyond
//! the occasional lowercase copy, so the classifier keeps its ≤50 ms
//! budget even on large diffs.

use lazy_static::lazy_static;
use regex::Regex;

use git_diff_engine::{FileChange, Language};

lazy_static! {
    /// Exported/public declaration shapes across the mainstream languages
    /// the graph ingester indexes.
    static ref EXPORT_RE: Regex = Regex::new(
        r"(?x)
        ^\s*(
            pub\s+(async\s+)?fn\s+\w+            # Rust
          | export\s+(async\s+)?function\s+\w+   # JS/TS
          | export\s+(default\s+)?(const|class)\s+\w+
          | public\s+[\w<>\[\]]+\s+\w+\s*\(      # Java/C#
          | def\s+\w+\s*\(                       # Python (module level)
        )"
    )
    .expect("static regex");

    /// HTTP route registration shapes.
    static ref ROUTE_RE: Regex = Regex::new(
        r#"(?x)
          @(app|router)\.(get|post|put|delete|patch)
        | \.route\s*\(\s*["']
        | (Router|router)\s*(::|\.)\s*(new\(\))?.*\.(get|post|put|delete|patch)\s*\(
        | (r|mux|e|app)\.(Get|Post|Put|Delete|Handle(Func)?)\s*\(
        "#
    )
    .expect("static regex");

    /// SQL statement built by string concatenation or inline formatting.
    static ref SQL_CONCAT_RE: Regex = Regex::new(
        r#"(?ix)
        (select|insert|update|delete)\s.*
        ( \+\s*\w | \{\} | %s | \|\|\s*\w | format!\( | f" )
        "#
    )
    .expect("static regex");

    /// Filesystem path assembled from request/user-controlled values.
    static ref PATH_JOIN_RE: Regex = Regex::new(
        r"(?i)(join|path\s*\+|os\.path\.join|filepath\.join|pathbuf::from)\s*\(?[^)\n]*\b(input|request|req|param|user|query)\w*",
    )
    .expect("static regex");

    /// Import/include statement at the start of a line.
    static ref IMPORT_RE: Regex = Regex::new(
        r"^\s*(use\s|import\s|from\s+\S+\s+import\s|#include\s|require\s*\()",
    )
    .expect("static regex");
}

/// Documentation files: markdown/rst or anything under `docs/`.
pub fn is_docs_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".md")
        || lower.ends_with(".rst")
        || lower.ends_with(".markdown")
        || lower.starts_with("docs/")
        || lower.contains("/docs/")
}

/// Configuration files: dotenv, yaml/toml, compose, k8s manifests.
pub fn is_config_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    name.starts_with(".env")
        || name.starts_with("docker-compose")
        || lower.starts_with("k8s/")
        || lower.contains("/k8s/")
        || lower.ends_with(".yaml")
        || lower.ends_with(".yml")
        || lower.ends_with(".toml")
}

/// Test files by the usual naming conventions.
pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    lower.starts_with("tests/")
        || lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.starts_with("test/")
        || name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.")
}

/// Schema/contract files whose edits always count as interface changes.
pub fn is_schema_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".proto")
        || lower.ends_with(".graphql")
        || lower.ends_with(".avsc")
        || lower.contains("openapi")
        || lower.contains("swagger")
        || (lower.contains("schema") && (lower.ends_with(".json") || lower.ends_with(".sql")))
}

/// True when the line declares an exported symbol or registers a route.
pub fn is_interface_line(line: &str) -> bool {
    EXPORT_RE.is_match(line) || ROUTE_RE.is_match(line)
}

/// Security-indicator scan over one added line.
pub fn security_hit(line: &str, keywords: &[String]) -> Option<String> {
    let lower = line.to_ascii_lowercase();
    for kw in keywords {
        if lower.contains(kw.as_str()) {
            return Some(format!("keyword {kw}"));
        }
    }
    if SQL_CONCAT_RE.is_match(line) {
        return Some("sql string concatenation".to_string());
    }
    if PATH_JOIN_RE.is_match(line) {
        return Some("path join on user input".to_string());
    }
    None
}

/// True when the line is whitespace, a comment, or an import — the edits
/// that rule "structural" treats as non-behavioral.
pub fn is_trivial_line(line: &str, language: Language) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    if IMPORT_RE.is_match(line) {
        return true;
    }
    match language {
        Language::Python | Language::Shell | Language::Yaml | Language::Toml => {
            trimmed.starts_with('#')
        }
        Language::Markdown => true,
        _ => {
            trimmed.starts_with("//")
                || trimmed.starts_with("/*")
                || trimmed.starts_with('*')
                || trimmed.starts_with("#")
        }
    }
}

/// Whether the whole file change consists of trivial lines (or is a pure
/// rename with no hunks).
pub fn is_trivial_change(file: &FileChange) -> bool {
    if file.binary {
        return false;
    }
    if file.hunks.is_empty() {
        return matches!(file.change_type, git_diff_engine::ChangeType::Rename { .. });
    }
    file.added_line_contents()
        .chain(file.removed_line_contents())
        .all(|l| is_trivial_line(l, file.language))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docs_config_test_paths() {
        assert!(is_docs_path("README.md"));
        assert!(is_docs_path("docs/guide.rst"));
        assert!(!is_docs_path("src/lib.rs"));

        assert!(is_config_path(".env.production"));
        assert!(is_config_path("deploy/docker-compose.yml"));
        assert!(is_config_path("k8s/deployment.yaml"));
        assert!(is_config_path("Cargo.toml"));
        assert!(!is_config_path("src/config.rs"));

        assert!(is_test_path("tests/integration.rs"));
        assert!(is_test_path("src/parser/foo_test.go"));
        assert!(is_test_path("web/button.spec.ts"));
        assert!(!is_test_path("src/contest.rs"));
    }

    #[test]
    fn interface_lines_cover_exports_and_routes() {
        assert!(is_interface_line("pub fn assess(diff: &Diff) -> Tier {"));
        assert!(is_interface_line("export function render(props) {"));
        assert!(is_interface_line("@app.get(\"/users\")"));
        assert!(is_interface_line("    .route(\"/health\", get(health))"));
        assert!(!is_interface_line("let x = compute();"));
    }

    #[test]
    fn security_hits_on_keywords_and_sql() {
        let kws = crate::config::ClassifierConfig::default().security_keywords;
        assert!(security_hit("let password = read();", &kws).is_some());
        assert!(security_hit("query(\"SELECT * FROM t WHERE id = \" + id)", &kws).is_some());
        assert!(security_hit("let sum = a + b;", &kws).is_none());
    }

    #[test]
    fn trivial_lines_by_language() {
        assert!(is_trivial_line("   ", Language::Rust));
        assert!(is_trivial_line("// comment", Language::Rust));
        assert!(is_trivial_line("use std::fmt;", Language::Rust));
        assert!(is_trivial_line("# note", Language::Python));
        assert!(!is_trivial_line("x += 1", Language::Python));
    }
}
