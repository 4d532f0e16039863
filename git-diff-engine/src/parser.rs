//! Parser for `git diff` patch output.
//!
//! Turns the raw unified diff produced by the git CLI into typed
//! [`FileChange`] records. The parser understands:
//! - `diff --git` file boundaries (including quoted paths),
//! - new/deleted file markers and rename pairs,
//! - `Binary files ... differ` / `GIT binary patch` markers,
//! - `@@ -a,b +c,d @@` hunk headers with running line numbering.
//!
//! It does **not** validate hunk counters strictly; they seed the running
//! positions and the classified lines carry the authoritative numbers.

use crate::errors::{DiffResult, ParseError};
use crate::types::{ChangeType, DiffHunk, DiffLine, FileChange, Language};

/// Parse a full multi-file patch into per-file changes.
pub fn parse_patch(patch: &str) -> DiffResult<Vec<FileChange>> {
    let mut files: Vec<FileChange> = Vec::new();
    let mut current: Option<PendingFile> = None;

    for line in patch.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(pending) = current.take() {
                files.push(pending.finish());
            }
            current = Some(PendingFile::from_header(rest)?);
            continue;
        }

        let Some(pending) = current.as_mut() else {
            // Preamble before the first file header (e.g. stat noise).
            continue;
        };

        if let Some(rest) = line.strip_prefix("@@") {
            pending.start_hunk(rest)?;
        } else if pending.in_hunk() {
            pending.push_hunk_line(line);
        } else {
            pending.consume_header_line(line);
        }
    }

    if let Some(pending) = current.take() {
        files.push(pending.finish());
    }

    Ok(files)
}

/// File record under construction.
struct PendingFile {
    header_old: String,
    header_new: String,
    minus_path: Option<String>,
    plus_path: Option<String>,
    rename_from: Option<String>,
    rename_to: Option<String>,
    is_new: bool,
    is_deleted: bool,
    binary: bool,
    hunks: Vec<DiffHunk>,
    // Running positions inside the open hunk.
    old_line: u32,
    new_line: u32,
    hunk_open: bool,
}

impl PendingFile {
    fn from_header(rest: &str) -> DiffResult<Self> {
        let (old, new) = split_header_paths(rest)
            .ok_or_else(|| ParseError::MissingPath(rest.to_string()))?;
        Ok(Self {
            header_old: old,
            header_new: new,
            minus_path: None,
            plus_path: None,
            rename_from: None,
            rename_to: None,
            is_new: false,
            is_deleted: false,
            binary: false,
            hunks: Vec::new(),
            old_line: 0,
            new_line: 0,
            hunk_open: false,
        })
    }

    fn in_hunk(&self) -> bool {
        self.hunk_open
    }

    fn consume_header_line(&mut self, line: &str) {
        if line.starts_with("new file mode") {
            self.is_new = true;
        } else if line.starts_with("deleted file mode") {
            self.is_deleted = true;
        } else if let Some(p) = line.strip_prefix("rename from ") {
            self.rename_from = Some(p.to_string());
        } else if let Some(p) = line.strip_prefix("rename to ") {
            self.rename_to = Some(p.to_string());
        } else if let Some(p) = line.strip_prefix("--- ") {
            self.minus_path = strip_side_prefix(p);
        } else if let Some(p) = line.strip_prefix("+++ ") {
            self.plus_path = strip_side_prefix(p);
        } else if line.starts_with("Binary files") || line.starts_with("GIT binary patch") {
            self.binary = true;
        }
        // "index", "old mode", "new mode", "similarity index", … are noise.
    }

    fn start_hunk(&mut self, rest: &str) -> DiffResult<()> {
        let header = parse_hunk_header(rest)?;
        self.hunks.push(DiffHunk {
            old_start: header.0,
            old_lines: header.1,
            new_start: header.2,
            new_lines: header.3,
            lines: Vec::new(),
        });
        self.old_line = header.0;
        self.new_line = header.2;
        self.hunk_open = true;
        Ok(())
    }

    fn push_hunk_line(&mut self, line: &str) {
        // `\ No newline at end of file` is positionless metadata.
        if line.starts_with('\\') {
            return;
        }
        let Some(hunk) = self.hunks.last_mut() else {
            return;
        };
        if let Some(content) = line.strip_prefix('+') {
            hunk.lines.push(DiffLine::Added {
                new_line: self.new_line,
                content: content.to_string(),
            });
            self.new_line += 1;
        } else if let Some(content) = line.strip_prefix('-') {
            hunk.lines.push(DiffLine::Removed {
                old_line: self.old_line,
                content: content.to_string(),
            });
            self.old_line += 1;
        } else if line.is_empty() || line.starts_with(' ') {
            let content = line.strip_prefix(' ').unwrap_or("").to_string();
            hunk.lines.push(DiffLine::Context {
                old_line: self.old_line,
                new_line: self.new_line,
                content,
            });
            self.old_line += 1;
            self.new_line += 1;
        } else {
            // Anything else ends the hunk body (next file header follows).
            self.hunk_open = false;
        }
    }

    fn finish(self) -> FileChange {
        let change_type = match (&self.rename_from, &self.rename_to) {
            (Some(from), Some(_)) => ChangeType::Rename { from: from.clone() },
            _ if self.is_new => ChangeType::Add,
            _ if self.is_deleted => ChangeType::Delete,
            _ => ChangeType::Modify,
        };

        // Post-change path: rename target, then `+++`, then `---` (for
        // deletions `+++` is /dev/null), then the `diff --git` header.
        let path = self
            .rename_to
            .clone()
            .or_else(|| self.plus_path.clone())
            .or_else(|| self.minus_path.clone())
            .unwrap_or_else(|| {
                if self.is_deleted {
                    self.header_old.clone()
                } else {
                    self.header_new.clone()
                }
            });

        let (mut added, mut removed) = (0u32, 0u32);
        for hunk in &self.hunks {
            for l in &hunk.lines {
                match l {
                    DiffLine::Added { .. } => added += 1,
                    DiffLine::Removed { .. } => removed += 1,
                    DiffLine::Context { .. } => {}
                }
            }
        }

        let language = Language::from_path(&path);
        FileChange {
            path,
            change_type,
            added_lines: added,
            removed_lines: removed,
            hunks: if self.binary { Vec::new() } else { self.hunks },
            language,
            binary: self.binary,
        }
    }
}

/// Split `a/old b/new` from a `diff --git` header, tolerating quoted paths.
fn split_header_paths(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim();
    if let Some(stripped) = rest.strip_prefix('"') {
        // `"a/with space" "b/with space"`
        let end = stripped.find('"')?;
        let old = stripped[..end].to_string();
        let tail = stripped[end + 1..].trim_start();
        let new = tail.trim_matches('"').to_string();
        return Some((normalize_side(&old), normalize_side(&new)));
    }
    // Unquoted: the separator is the first ` b/` after the `a/` part.
    let idx = rest.find(" b/")?;
    let old = &rest[..idx];
    let new = &rest[idx + 1..];
    Some((normalize_side(old), normalize_side(new)))
}

/// Strip the `a/` / `b/` prefix from one side of a header path.
fn normalize_side(p: &str) -> String {
    p.strip_prefix("a/")
        .or_else(|| p.strip_prefix("b/"))
        .unwrap_or(p)
        .to_string()
}

/// Resolve a `---`/`+++` path; `/dev/null` means "no file on this side".
fn strip_side_prefix(p: &str) -> Option<String> {
    let p = p.trim().trim_matches('"');
    if p == "/dev/null" {
        return None;
    }
    Some(normalize_side(p))
}

/// Parse ` -a,b +c,d @@ …` into (old_start, old_lines, new_start, new_lines).
///
/// An omitted count (`@@ -1 +1 @@`) means 1 per the unified diff format.
fn parse_hunk_header(rest: &str) -> DiffResult<(u32, u32, u32, u32)> {
    let s = rest.trim();
    let mut parts = s.split_whitespace();
    let old_part = parts
        .next()
        .and_then(|p| p.strip_prefix('-'))
        .ok_or_else(|| ParseError::InvalidHunkHeader(s.to_string()))?;
    let new_part = parts
        .next()
        .and_then(|p| p.strip_prefix('+'))
        .ok_or_else(|| ParseError::InvalidHunkHeader(s.to_string()))?;

    let (old_start, old_lines) = split_range(old_part, s)?;
    let (new_start, new_lines) = split_range(new_part, s)?;
    Ok((old_start, old_lines, new_start, new_lines))
}

fn split_range(part: &str, header: &str) -> DiffResult<(u32, u32)> {
    let mut it = part.split(',');
    let start = it
        .next()
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| ParseError::InvalidHunkHeader(header.to_string()))?;
    let len = match it.next() {
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidHunkHeader(header.to_string()))?,
        None => 1,
    };
    Ok((start, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODIFY: &str = "\
diff --git a/src/auth.rs b/src/auth.rs
index 1111111..2222222 100644
--- a/src/auth.rs
+++ b/src/auth.rs
@@ -10,4 +10,5 @@ fn check() {
 context
-old line
+new line
+extra line
 tail
";

    #[test]
    fn parses_single_modify() {
        let files = parse_patch(MODIFY).unwrap();
        assert_eq!(files.len(), 1);
        let f = &files[0];
        assert_eq!(f.path, "src/auth.rs");
        assert_eq!(f.change_type, ChangeType::Modify);
        assert_eq!(f.added_lines, 2);
        assert_eq!(f.removed_lines, 1);
        assert_eq!(f.hunks.len(), 1);
        assert_eq!(f.language, Language::Rust);
    }

    #[test]
    fn running_line_numbers_track_hunk_positions() {
        let files = parse_patch(MODIFY).unwrap();
        let hunk = &files[0].hunks[0];
        match &hunk.lines[1] {
            DiffLine::Removed { old_line, .. } => assert_eq!(*old_line, 11),
            other => panic!("expected removed, got {other:?}"),
        }
        match &hunk.lines[3] {
            DiffLine::Added { new_line, .. } => assert_eq!(*new_line, 12),
            other => panic!("expected added, got {other:?}"),
        }
    }

    #[test]
    fn parses_new_and_deleted_files() {
        let patch = "\
diff --git a/new.py b/new.py
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/new.py
@@ -0,0 +1,2 @@
+print(1)
+print(2)
diff --git a/gone.md b/gone.md
deleted file mode 100644
index 4444444..0000000
--- a/gone.md
+++ /dev/null
@@ -1,1 +0,0 @@
-bye
";
        let files = parse_patch(patch).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].change_type, ChangeType::Add);
        assert_eq!(files[0].path, "new.py");
        assert_eq!(files[0].added_lines, 2);
        assert_eq!(files[1].change_type, ChangeType::Delete);
        assert_eq!(files[1].path, "gone.md");
        assert_eq!(files[1].removed_lines, 1);
    }

    #[test]
    fn parses_rename_with_similarity() {
        let patch = "\
diff --git a/old/name.rs b/new/name.rs
similarity index 92%
rename from old/name.rs
rename to new/name.rs
index 5555555..6666666 100644
--- a/old/name.rs
+++ b/new/name.rs
@@ -1,2 +1,2 @@
-fn a() {}
+fn b() {}
 // keep
";
        let files = parse_patch(patch).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "new/name.rs");
        assert_eq!(
            files[0].change_type,
            ChangeType::Rename { from: "old/name.rs".into() }
        );
    }

    #[test]
    fn binary_files_carry_marker_and_no_hunks() {
        let patch = "\
diff --git a/logo.png b/logo.png
index 7777777..8888888 100644
Binary files a/logo.png and b/logo.png differ
";
        let files = parse_patch(patch).unwrap();
        assert!(files[0].binary);
        assert!(files[0].hunks.is_empty());
        assert_eq!(files[0].added_lines, 0);
    }

    #[test]
    fn hunk_header_with_omitted_count_defaults_to_one() {
        let patch = "\
diff --git a/one.txt b/one.txt
index 9999999..aaaaaaa 100644
--- a/one.txt
+++ b/one.txt
@@ -1 +1 @@
-x
+y
";
        let files = parse_patch(patch).unwrap();
        let hunk = &files[0].hunks[0];
        assert_eq!((hunk.old_start, hunk.old_lines), (1, 1));
        assert_eq!((hunk.new_start, hunk.new_lines), (1, 1));
    }

    #[test]
    fn no_newline_marker_is_ignored() {
        let patch = "\
diff --git a/t.txt b/t.txt
index bbbbbbb..ccccccc 100644
--- a/t.txt
+++ b/t.txt
@@ -1,1 +1,1 @@
-a
\\ No newline at end of file
+b
\\ No newline at end of file
";
        let files = parse_patch(patch).unwrap();
        assert_eq!(files[0].added_lines, 1);
        assert_eq!(files[0].removed_lines, 1);
    }
}
