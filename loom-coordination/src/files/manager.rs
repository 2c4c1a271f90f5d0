//! Local File Manager (spec §4.D) — the non-sandbox backend for the file
//! action family. All paths route through `safe_join`; writes are atomic
//! via tempfile-then-rename, matching the teacher's write-path idiom
//! (`harness` writes progress files the same way to avoid torn reads).

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::patch::{extract_patch_target_paths, is_blocked_patch_path, match_and_replace, MatchKind};
use super::safe_path::safe_join;
use crate::error::{CoordinationError, CoordinationResult};

pub const MAX_READ_BYTES: u64 = 1024 * 1024;
pub const MAX_TREE_ENTRIES: usize = 500;
pub const DEFAULT_TREE_DEPTH: u32 = 4;
pub const MAX_SEARCH_HITS: usize = 200;
pub const MAX_PATCH_BYTES: usize = 10 * 1024 * 1024;

pub struct LocalFileManager {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub matched: bool,
    pub strategy: String,
    pub content: String,
}

impl LocalFileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, rel: &str) -> CoordinationResult<PathBuf> {
        safe_join(&self.root, rel)
    }

    pub fn read_file(&self, rel: &str) -> CoordinationResult<String> {
        let path = self.resolve(rel)?;
        let metadata = fs::metadata(&path)?;
        if metadata.len() > MAX_READ_BYTES {
            return Err(CoordinationError::Validation {
                message: format!("{rel} is {} bytes, exceeds the {MAX_READ_BYTES}-byte read limit", metadata.len()),
            });
        }
        Ok(fs::read_to_string(path)?)
    }

    pub fn write_file(&self, rel: &str, content: &str) -> CoordinationResult<()> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&path, content)
    }

    pub fn read_tree(&self, rel: &str, max_depth: u32) -> CoordinationResult<Vec<TreeEntry>> {
        let root = self.resolve(rel)?;
        let mut entries = Vec::new();
        walk(&root, &root, 0, max_depth, &mut entries)?;
        entries.truncate(MAX_TREE_ENTRIES);
        Ok(entries)
    }

    pub fn search_text(&self, rel: &str, query: &str) -> CoordinationResult<Vec<SearchHit>> {
        let root = self.resolve(rel)?;
        let mut hits = Vec::new();
        search_dir(&root, &self.root, query, &mut hits)?;
        hits.truncate(MAX_SEARCH_HITS);
        Ok(hits)
    }

    pub fn move_file(&self, from_rel: &str, to_rel: &str) -> CoordinationResult<()> {
        let from = self.resolve(from_rel)?;
        let to = self.resolve(to_rel)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from, to)?;
        Ok(())
    }

    pub fn rename_file(&self, from_rel: &str, to_rel: &str) -> CoordinationResult<()> {
        self.move_file(from_rel, to_rel)
    }

    pub fn delete_file(&self, rel: &str) -> CoordinationResult<()> {
        let path = self.resolve(rel)?;
        fs::remove_file(path)?;
        Ok(())
    }

    /// `EditCode`: `MatchAndReplace` the whole file against `old`/`new`.
    pub fn edit_code(&self, rel: &str, old: &str, new: &str) -> CoordinationResult<EditOutcome> {
        let path = self.resolve(rel)?;
        let source = fs::read_to_string(&path)?;
        let outcome = match_and_replace(&source, old, new);
        if !outcome.matched {
            return Err(CoordinationError::Validation {
                message: format!(
                    "old_text not found in {rel} under any matching strategy; re-read the file and copy exact text"
                ),
            });
        }
        atomic_write(&path, &outcome.result)?;
        Ok(EditOutcome { matched: true, strategy: outcome.strategy.to_string(), content: outcome.result })
    }

    /// `ApplyPatch`: extract target paths, block-list check, `git apply
    /// --check` then `git apply --whitespace=nowarn --recount`.
    pub fn apply_patch(&self, patch: &str) -> CoordinationResult<Vec<String>> {
        if patch.len() > MAX_PATCH_BYTES {
            return Err(CoordinationError::Validation {
                message: format!("patch is {} bytes, exceeds the {MAX_PATCH_BYTES}-byte limit", patch.len()),
            });
        }
        let targets = extract_patch_target_paths(patch);
        if targets.is_empty() {
            return Err(CoordinationError::Validation { message: "patch names no target files".to_string() });
        }
        for target in &targets {
            if is_blocked_patch_path(target) {
                return Err(CoordinationError::Policy { message: format!("patch touches blocked path `{target}`") });
            }
            self.resolve(target)?;
        }

        run_git_apply(&self.root, patch, true)?;
        run_git_apply(&self.root, patch, false)?;
        Ok(targets)
    }
}

fn atomic_write(path: &Path, content: &str) -> CoordinationResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| CoordinationError::Io(e.error))?;
    Ok(())
}

fn walk(root: &Path, current: &Path, depth: u32, max_depth: u32, out: &mut Vec<TreeEntry>) -> CoordinationResult<()> {
    if depth > max_depth || out.len() >= MAX_TREE_ENTRIES {
        return Ok(());
    }
    let mut read_dir: Vec<_> = fs::read_dir(current)?.filter_map(Result::ok).collect();
    read_dir.sort_by_key(|e| e.file_name());
    for entry in read_dir {
        if out.len() >= MAX_TREE_ENTRIES {
            break;
        }
        let path = entry.path();
        if path.components().any(|c| c.as_os_str() == ".git") {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().to_string();
        let is_dir = path.is_dir();
        out.push(TreeEntry { path: relative, is_dir });
        if is_dir {
            walk(root, &path, depth + 1, max_depth, out)?;
        }
    }
    Ok(())
}

fn search_dir(dir: &Path, root: &Path, query: &str, out: &mut Vec<SearchHit>) -> CoordinationResult<()> {
    if out.len() >= MAX_SEARCH_HITS {
        return Ok(());
    }
    if dir.is_file() {
        return search_file(dir, root, query, out);
    }
    let mut read_dir: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();
    read_dir.sort_by_key(|e| e.file_name());
    for entry in read_dir {
        if out.len() >= MAX_SEARCH_HITS {
            break;
        }
        let path = entry.path();
        if path.components().any(|c| c.as_os_str() == ".git") {
            continue;
        }
        if path.is_dir() {
            search_dir(&path, root, query, out)?;
        } else {
            search_file(&path, root, query, out)?;
        }
    }
    Ok(())
}

fn search_file(path: &Path, root: &Path, query: &str, out: &mut Vec<SearchHit>) -> CoordinationResult<()> {
    let Ok(content) = fs::read_to_string(path) else {
        return Ok(()); // binary or unreadable file, skip
    };
    let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
    for (idx, line) in content.lines().enumerate() {
        if out.len() >= MAX_SEARCH_HITS {
            break;
        }
        if line.contains(query) {
            out.push(SearchHit { path: relative.clone(), line: idx + 1, text: line.to_string() });
        }
    }
    Ok(())
}

fn run_git_apply(root: &Path, patch: &str, check_only: bool) -> CoordinationResult<()> {
    use std::process::{Command, Stdio};

    let mut args = vec!["apply"];
    if check_only {
        args.push("--check");
    } else {
        args.push("--whitespace=nowarn");
        args.push("--recount");
    }

    let mut child = Command::new("git")
        .args(&args)
        .current_dir(root)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    child.stdin.as_mut().expect("piped stdin").write_all(patch.as_bytes())?;
    let output = child.wait_with_output()?;

    if !output.status.success() {
        return Err(CoordinationError::Validation {
            message: format!("git apply failed: {}", String::from_utf8_lossy(&output.stderr)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, LocalFileManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = LocalFileManager::new(dir.path());
        (dir, manager)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, manager) = manager();
        manager.write_file("src/lib.rs", "fn main() {}").unwrap();
        assert_eq!(manager.read_file("src/lib.rs").unwrap(), "fn main() {}");
    }

    #[test]
    fn read_rejects_escape() {
        let (_dir, manager) = manager();
        assert!(manager.read_file("../outside").is_err());
    }

    #[test]
    fn read_rejects_oversized_file() {
        let (dir, manager) = manager();
        let big = "x".repeat((MAX_READ_BYTES + 1) as usize);
        fs::write(dir.path().join("big.txt"), &big).unwrap();
        assert!(manager.read_file("big.txt").is_err());
    }

    #[test]
    fn read_tree_lists_nested_entries() {
        let (_dir, manager) = manager();
        manager.write_file("a/b.rs", "x").unwrap();
        manager.write_file("a/c.rs", "y").unwrap();
        let entries = manager.read_tree(".", DEFAULT_TREE_DEPTH).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"a"));
        assert!(paths.iter().any(|p| p.ends_with("b.rs")));
    }

    #[test]
    fn search_text_finds_matching_lines() {
        let (_dir, manager) = manager();
        manager.write_file("a.txt", "hello\nworld\nhello again\n").unwrap();
        let hits = manager.search_text(".", "hello").unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn edit_code_applies_exact_match() {
        let (_dir, manager) = manager();
        manager.write_file("a.rs", "fn a() {}\n").unwrap();
        let outcome = manager.edit_code("a.rs", "fn a() {}", "fn a() { 1 }").unwrap();
        assert_eq!(outcome.strategy, MatchKind::Exact.to_string());
        assert_eq!(manager.read_file("a.rs").unwrap(), "fn a() { 1 }\n");
    }

    #[test]
    fn edit_code_reports_no_match_as_validation_error() {
        let (_dir, manager) = manager();
        manager.write_file("a.rs", "fn a() {}\n").unwrap();
        let err = manager.edit_code("a.rs", "fn nowhere() {}", "x").unwrap_err();
        assert!(matches!(err, CoordinationError::Validation { .. }));
    }

    #[test]
    fn apply_patch_rejects_blocked_target() {
        let (_dir, manager) = manager();
        let patch = "diff --git a/.env b/.env\n--- a/.env\n+++ b/.env\n@@ -0,0 +1 @@\n+SECRET=1\n";
        let err = manager.apply_patch(patch).unwrap_err();
        assert!(matches!(err, CoordinationError::Policy { .. }));
    }
}
