//! Branch naming and the protected-branch list (spec §4.E).

use std::sync::LazyLock;

use regex::Regex;

const MAX_BRANCH_NAME_LEN: usize = 72;
const PROTECTED_EXACT: &[&str] = &["main", "master", "production"];

static PROTECTED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(release/|hotfix/)").expect("valid protected-prefix regex"));

pub fn is_protected_branch(branch: &str) -> bool {
    PROTECTED_EXACT.contains(&branch) || PROTECTED_PREFIX.is_match(branch)
}

/// `<prefix>` + bead_id + `/` + slugify(description, cap 40).
pub fn generate_branch_name(prefix: &str, bead_id: &str, description: &str) -> String {
    format!("{prefix}{bead_id}/{}", slugify(description, 40))
}

/// Lowercase; `_` → `-`; strip anything outside `[a-z0-9-]`; collapse `-`
/// runs; trim leading/trailing `-`; cap length.
pub fn slugify(input: &str, max_len: usize) -> String {
    let lowered = input.to_lowercase().replace('_', "-");
    let mut filtered: String =
        lowered.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' }).collect();

    while filtered.contains("--") {
        filtered = filtered.replace("--", "-");
    }
    let trimmed = filtered.trim_matches('-');
    let truncated: String = trimmed.chars().take(max_len).collect();
    truncated.trim_matches('-').to_string()
}

/// Validate a branch name: length, whitespace, required prefix.
pub fn validate_branch_name(branch: &str, required_prefix: &str) -> Result<(), String> {
    if branch.len() > MAX_BRANCH_NAME_LEN {
        return Err(format!("branch name `{branch}` exceeds {MAX_BRANCH_NAME_LEN} characters"));
    }
    if branch.chars().any(char::is_whitespace) {
        return Err(format!("branch name `{branch}` contains whitespace"));
    }
    if !branch.starts_with(required_prefix) {
        return Err(format!("branch name `{branch}` missing required prefix `{required_prefix}`"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_maps_underscore() {
        assert_eq!(slugify("Fix_The Bug", 40), "fix-the-bug");
    }

    #[test]
    fn slugify_strips_non_alphanumeric_and_collapses_dashes() {
        assert_eq!(slugify("fix!!!the   bug???", 40), "fix-the-bug");
    }

    #[test]
    fn slugify_trims_leading_and_trailing_dashes() {
        assert_eq!(slugify("--fix-bug--", 40), "fix-bug");
    }

    #[test]
    fn slugify_caps_length() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long, 40).len(), 40);
    }

    #[test]
    fn generate_branch_name_matches_spec_shape() {
        let name = generate_branch_name("bead/", "bd-123", "Fix the login bug");
        assert_eq!(name, "bead/bd-123/fix-the-login-bug");
    }

    #[test]
    fn protected_branches_cover_exact_and_prefix() {
        assert!(is_protected_branch("main"));
        assert!(is_protected_branch("master"));
        assert!(is_protected_branch("production"));
        assert!(is_protected_branch("release/1.2"));
        assert!(is_protected_branch("hotfix/urgent"));
        assert!(!is_protected_branch("bead/bd-123/fix-bug"));
    }

    #[test]
    fn validate_branch_name_rejects_too_long() {
        let long = format!("bead/{}", "x".repeat(80));
        assert!(validate_branch_name(&long, "bead/").is_err());
    }

    #[test]
    fn validate_branch_name_rejects_whitespace() {
        assert!(validate_branch_name("bead/has space", "bead/").is_err());
    }

    #[test]
    fn validate_branch_name_requires_prefix() {
        assert!(validate_branch_name("other/bd-123", "bead/").is_err());
        assert!(validate_branch_name("bead/bd-123", "bead/").is_ok());
    }
}
