//! `safeJoin` — the path-escape guard every file operation routes through
//! (spec §4.D). Rejects absolute paths, `..` traversal, and anything that
//! touches a `.git` directory, the way the teacher's `tools::sandbox_check`
//! canonicalizes and checks `starts_with` before trusting a path.

use std::path::{Component, Path, PathBuf};

use crate::error::{CoordinationError, CoordinationResult};

/// Resolve `rel` against `base`, rejecting escapes. Never touches the
/// filesystem — this is a pure path computation so it can guard writes to
/// paths that don't exist yet.
pub fn safe_join(base: &Path, rel: &str) -> CoordinationResult<PathBuf> {
    let rel_path = Path::new(rel);

    if rel_path.is_absolute() {
        return Err(escape_err(rel));
    }

    let mut resolved = PathBuf::from(base);
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(escape_err(rel)),
            Component::RootDir | Component::Prefix(_) => return Err(escape_err(rel)),
        }
    }

    if !resolved.starts_with(base) {
        return Err(escape_err(rel));
    }

    if touches_git_dir(&resolved, base) {
        return Err(escape_err(rel));
    }

    Ok(resolved)
}

fn touches_git_dir(resolved: &Path, base: &Path) -> bool {
    let Ok(relative) = resolved.strip_prefix(base) else {
        return false;
    };
    relative.components().any(|c| c.as_os_str() == ".git")
}

fn escape_err(rel: &str) -> CoordinationError {
    CoordinationError::PathEscape { path: rel.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base() -> PathBuf {
        PathBuf::from("/workspace/project")
    }

    #[test]
    fn joins_plain_relative_path() {
        let joined = safe_join(&base(), "src/lib.rs").unwrap();
        assert_eq!(joined, base().join("src/lib.rs"));
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(safe_join(&base(), "/etc/passwd").is_err());
    }

    #[test]
    fn rejects_parent_dir_escape() {
        assert!(safe_join(&base(), "../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_embedded_parent_dir_escape() {
        assert!(safe_join(&base(), "src/../../secrets").is_err());
    }

    #[test]
    fn rejects_git_directory_component() {
        assert!(safe_join(&base(), ".git/config").is_err());
        assert!(safe_join(&base(), "sub/.git/hooks/pre-commit").is_err());
    }

    #[test]
    fn rejects_path_ending_in_git() {
        assert!(safe_join(&base(), "worktrees/.git").is_err());
    }

    #[test]
    fn allows_curdir_components() {
        let joined = safe_join(&base(), "./src/./lib.rs").unwrap();
        assert_eq!(joined, base().join("src/lib.rs"));
    }

    proptest::proptest! {
        /// No sequence of normal path segments, however deep, escapes `base`.
        #[test]
        fn never_escapes_base_for_normal_segments(segments in proptest::collection::vec("[a-zA-Z0-9_.-]{1,12}", 0..8)) {
            let rel = segments.join("/");
            if let Ok(resolved) = safe_join(&base(), &rel) {
                prop_assert!(resolved.starts_with(base()));
            }
        }

        /// Any relative path containing a literal `..` segment is always rejected.
        #[test]
        fn always_rejects_parent_segment(prefix in "[a-zA-Z0-9_/]{0,10}", suffix in "[a-zA-Z0-9_/]{0,10}") {
            let rel = format!("{prefix}/../{suffix}");
            prop_assert!(safe_join(&base(), &rel).is_err());
        }
    }
}
