//! Truncation rules for the Feedback Formatter (spec §4.G).

pub const FILE_CONTENT_LIMIT: usize = 32_000;
pub const BUILD_OUTPUT_LIMIT: usize = 4_000;
pub const COMMAND_STREAM_LIMIT: usize = 6_000;

/// Plain byte-cap truncation with a marker noting how much was cut.
pub fn truncate_bytes(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let cut = floor_char_boundary(text, limit);
    format!("{}\n...[truncated {} bytes]", &text[..cut], text.len() - cut)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Build/test output truncation: extract candidate error lines first
/// (containing "error", "fail", "undefined", "cannot", or a `file:line:col`
/// pattern); if none found, fall back to keeping the tail.
pub fn truncate_build_output(text: &str) -> String {
    if text.len() <= BUILD_OUTPUT_LIMIT {
        return text.to_string();
    }

    let candidates: Vec<&str> = text.lines().filter(|line| is_candidate_error_line(line)).collect();

    let joined = if candidates.is_empty() { tail_to_limit(text, BUILD_OUTPUT_LIMIT) } else { candidates.join("\n") };

    truncate_bytes(&joined, BUILD_OUTPUT_LIMIT)
}

fn is_candidate_error_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("error") || lower.contains("fail") || lower.contains("undefined") || lower.contains("cannot")
        || file_line_col_pattern(line)
}

/// A conservative `path:line:col`-shaped match: two `:`-separated numeric
/// groups somewhere after a path-like segment, without pulling in a regex
/// dependency just for this.
fn file_line_col_pattern(line: &str) -> bool {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() < 3 {
        return false;
    }
    parts.windows(2).any(|w| w[0].chars().all(|c| c.is_ascii_digit()) && !w[0].is_empty())
}

fn tail_to_limit(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let start = floor_char_boundary(text, text.len() - limit);
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_bytes_passes_short_text_through() {
        assert_eq!(truncate_bytes("short", 100), "short");
    }

    #[test]
    fn truncate_bytes_cuts_long_text_with_marker() {
        let text = "a".repeat(100);
        let truncated = truncate_bytes(&text, 10);
        assert!(truncated.starts_with(&"a".repeat(10)));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn build_output_keeps_error_lines_when_present() {
        let mut lines = vec!["note: compiling".to_string()];
        lines.extend((0..2000).map(|i| format!("info line {i}")));
        lines.push("error[E0308]: mismatched types".to_string());
        lines.push("src/lib.rs:10:5: cannot find value `x`".to_string());
        let text = lines.join("\n");

        let truncated = truncate_build_output(&text);
        assert!(truncated.contains("error[E0308]"));
        assert!(truncated.contains("cannot find value"));
        assert!(!truncated.contains("compiling"));
    }

    #[test]
    fn build_output_falls_back_to_tail_when_no_error_lines() {
        let lines: Vec<String> = (0..2000).map(|i| format!("build step {i} ok")).collect();
        let text = lines.join("\n");
        let truncated = truncate_build_output(&text);
        assert!(truncated.contains("build step 1999 ok"));
        assert!(!truncated.contains("build step 0 ok"));
    }

    #[test]
    fn short_build_output_is_unchanged() {
        assert_eq!(truncate_build_output("all good"), "all good");
    }
}
