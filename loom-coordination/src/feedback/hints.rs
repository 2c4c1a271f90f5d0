//! Targeted remediation hints, keyed on substrings of an error message
//! (spec §4.G), grounded on the teacher's `feedback::error_parser`
//! pattern-table idiom.

const HINT_TABLE: &[(&str, &str)] = &[
    ("not found in", "The text you tried to match was not found; re-read the file and copy exact text."),
    ("no such file", "Path does not exist; use read_tree or search_text to locate the correct path."),
    ("escapes project", "Paths must be relative to the project workdir; do not use absolute paths or `..`."),
];

/// Substrings that additionally append a "REQUIRED ACTION" clause telling
/// the agent not to call `done` until the condition is fixed.
const REQUIRED_ACTION_TABLE: &[(&str, &str)] = &[
    ("toolchain not found", "REQUIRED ACTION: install the missing toolchain before calling done."),
    ("build failed", "REQUIRED ACTION: fix the build before calling done."),
];

/// Collect every hint whose key substring appears in `error_message`,
/// in table order.
pub fn remediation_hints(error_message: &str) -> Vec<String> {
    let lower = error_message.to_lowercase();
    let mut hints = Vec::new();
    for (needle, hint) in HINT_TABLE {
        if lower.contains(needle) {
            hints.push((*hint).to_string());
        }
    }
    for (needle, hint) in REQUIRED_ACTION_TABLE {
        if lower.contains(needle) {
            hints.push((*hint).to_string());
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_not_found_suggests_reread() {
        let hints = remediation_hints("old_text not found in src/lib.rs");
        assert!(hints.iter().any(|h| h.contains("re-read")));
    }

    #[test]
    fn no_such_file_suggests_tree_or_search() {
        let hints = remediation_hints("no such file or directory");
        assert!(hints.iter().any(|h| h.contains("read_tree")));
    }

    #[test]
    fn escapes_project_reminds_about_relative_paths() {
        let hints = remediation_hints("path `/etc/passwd` escapes project workdir");
        assert!(hints.iter().any(|h| h.contains("relative")));
    }

    #[test]
    fn toolchain_missing_includes_required_action() {
        let hints = remediation_hints("toolchain not found: cargo");
        assert!(hints.iter().any(|h| h.starts_with("REQUIRED ACTION")));
    }

    #[test]
    fn build_failed_includes_required_action() {
        let hints = remediation_hints("build failed with 3 errors");
        assert!(hints.iter().any(|h| h.starts_with("REQUIRED ACTION")));
    }

    #[test]
    fn unmatched_message_has_no_hints() {
        assert!(remediation_hints("everything is fine").is_empty());
    }

    #[test]
    fn multiple_substrings_accumulate_hints() {
        let hints = remediation_hints("build failed: old_text not found in a.rs");
        assert_eq!(hints.len(), 2);
    }
}
