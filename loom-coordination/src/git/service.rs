//! Git Service (spec §4.E): status/diff/branch/commit/push/merge/revert/
//! log, grounded on the teacher's `harness::GitManager` (subprocess runner
//! with exponential-backoff retry, `recent_commits` log parsing).

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::{AuditLogger, GitAuditRecord};
use super::branch::{generate_branch_name, is_protected_branch, validate_branch_name};
use crate::error::{CoordinationError, CoordinationResult};
use crate::policy::secrets::{has_sensitive_filename, scan_diff};

const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;

pub struct GitService {
    working_dir: PathBuf,
    branch_prefix: String,
    max_retries: u32,
    audit: AuditLogger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitLogEntry {
    pub hash: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestOutcome {
    pub created: bool,
    pub url: Option<String>,
    pub title: String,
    pub body: String,
}

pub struct CommitRequest<'a> {
    pub bead_id: &'a str,
    pub agent_id: &'a str,
    pub message: Option<&'a str>,
    pub files: &'a [String],
    pub allow_all: bool,
}

impl GitService {
    pub fn new(working_dir: impl AsRef<Path>, branch_prefix: impl Into<String>, project_id: impl Into<String>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        let project_id = project_id.into();
        Self {
            audit: AuditLogger::new(working_dir.join(".loom-audit.log"), project_id),
            working_dir,
            branch_prefix: branch_prefix.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    fn run(&self, args: &[&str]) -> CoordinationResult<String> {
        let output = Command::new("git").args(args).current_dir(&self.working_dir).output()?;
        if !output.status.success() {
            return Err(CoordinationError::Policy {
                message: format!("git {}: {}", args.join(" "), String::from_utf8_lossy(&output.stderr)),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_with_retry(&self, args: &[&str]) -> CoordinationResult<String> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match self.run(args) {
                Ok(out) => return Ok(out),
                Err(e) => {
                    if attempt < self.max_retries {
                        std::thread::sleep(std::time::Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
                        last_err = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Err(last_err.unwrap_or(CoordinationError::Policy { message: "retries exhausted".to_string() }))
    }

    pub fn status(&self) -> CoordinationResult<String> {
        self.run(&["status", "--porcelain"])
    }

    pub fn diff(&self) -> CoordinationResult<String> {
        self.run(&["diff"])
    }

    pub fn staged_diff(&self) -> CoordinationResult<String> {
        self.run(&["diff", "--cached"])
    }

    pub fn fetch(&self) -> CoordinationResult<String> {
        self.run_with_retry(&["fetch"])
    }

    pub fn current_branch(&self) -> CoordinationResult<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn list_branches(&self) -> CoordinationResult<Vec<String>> {
        let out = self.run(&["branch", "--format=%(refname:short)"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn log(&self, branch: Option<&str>, max_count: u32) -> CoordinationResult<Vec<CommitLogEntry>> {
        let count_arg = format!("-{max_count}");
        let mut args = vec!["log", "--format=%H|%s|%aI", &count_arg];
        if let Some(b) = branch {
            args.push(b);
        }
        let out = self.run(&args)?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, '|');
                let hash = parts.next()?.to_string();
                let message = parts.next()?.to_string();
                let timestamp = parts.next().and_then(|ts| DateTime::parse_from_rfc3339(ts).ok()).map(|dt| dt.with_timezone(&Utc));
                Some(CommitLogEntry { hash, message, timestamp })
            })
            .collect())
    }

    pub fn diff_branches(&self, source: &str, target: &str) -> CoordinationResult<String> {
        self.run(&["diff", &format!("{target}...{source}")])
    }

    /// Create (or reuse) a bead branch and check it out. Spec.md: "already
    /// on a non-protected branch means assume correct branch."
    pub fn checkout_bead_branch(&self, bead_id: &str, description: &str) -> CoordinationResult<String> {
        let current = self.current_branch()?;
        if !is_protected_branch(&current) {
            return Ok(current);
        }
        let branch = generate_branch_name(&self.branch_prefix, bead_id, description);
        validate_branch_name(&branch, &self.branch_prefix)
            .map_err(|message| CoordinationError::Validation { message })?;
        self.run_with_retry(&["checkout", "-b", &branch])?;
        Ok(branch)
    }

    pub fn checkout(&self, branch: &str) -> CoordinationResult<()> {
        self.run_with_retry(&["checkout", branch])?;
        Ok(())
    }

    pub fn delete_branch(&self, branch: &str, delete_remote: bool) -> CoordinationResult<()> {
        if is_protected_branch(branch) {
            return Err(CoordinationError::Policy { message: format!("refusing to delete protected branch `{branch}`") });
        }
        self.run_with_retry(&["branch", "-D", branch])?;
        if delete_remote {
            self.run_with_retry(&["push", "origin", "--delete", branch])?;
        }
        Ok(())
    }

    /// `git_commit` path: auto-branch off a protected branch, secret scan,
    /// trailer injection, commit. Auto-push + PR are the router's concern
    /// once this returns a sha. Callers supply the already-computed
    /// quality gate outcome; this service does not invoke builds itself.
    pub fn commit(&self, req: CommitRequest<'_>, gate_passed: bool) -> CoordinationResult<String> {
        let start = std::time::Instant::now();
        let result = self.commit_inner(&req, gate_passed);
        self.audit.append(GitAuditRecord {
            op: "commit".to_string(),
            bead_id: req.bead_id.to_string(),
            git_ref: self.current_branch().unwrap_or_default(),
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            duration_ms: start.elapsed().as_millis() as u64,
        });
        result
    }

    fn commit_inner(&self, req: &CommitRequest<'_>, gate_passed: bool) -> CoordinationResult<String> {
        if !gate_passed {
            return Err(CoordinationError::Policy { message: "quality gate did not pass; commit refused".to_string() });
        }

        let description = req.message.and_then(|m| m.lines().next()).filter(|l| !l.is_empty()).unwrap_or("work produced by agent");
        self.checkout_bead_branch(req.bead_id, description)?;

        if req.allow_all {
            self.run(&["add", "-A"])?;
        } else {
            for file in req.files {
                if has_sensitive_filename(file) {
                    return Err(CoordinationError::Policy { message: format!("refusing to stage sensitive file `{file}`") });
                }
                self.run(&["add", "--", file])?;
            }
        }

        let staged = self.staged_diff()?;
        let secret_hits = scan_diff(&staged);
        if !secret_hits.is_empty() {
            let summary: Vec<String> = secret_hits.iter().map(|h| h.description.clone()).collect();
            return Err(CoordinationError::Policy { message: format!("secret scan hit: {}", summary.join("; ")) });
        }

        let message = build_commit_message(req.message, req.bead_id, req.agent_id);
        self.run_with_retry(&["commit", "-m", &message])?;
        self.run(&["rev-parse", "HEAD"])
    }

    /// Force push is never allowed. Pre-push test invocation is the
    /// caller's responsibility (sandbox or local test runner); absence of
    /// a test system is treated as a pass.
    pub fn push(&self, branch: Option<&str>, set_upstream: bool, force: bool) -> CoordinationResult<()> {
        if force {
            return Err(CoordinationError::Policy { message: "force push is forbidden".to_string() });
        }
        let mut args = vec!["push"];
        if set_upstream {
            args.push("-u");
        }
        args.push("origin");
        let branch_owned;
        if let Some(b) = branch {
            branch_owned = b.to_string();
            args.push(&branch_owned);
        }
        self.run_with_retry(&args)?;
        Ok(())
    }

    /// `--no-ff` by default (spec §4.F default policy). Merging into a
    /// protected branch via the agent interface is forbidden; must go via
    /// PR.
    pub fn merge(&self, source_branch: &str, message: Option<&str>, no_ff: Option<bool>) -> CoordinationResult<String> {
        let target = self.current_branch()?;
        if is_protected_branch(&target) {
            return Err(CoordinationError::Policy {
                message: "merging into a protected branch requires a pull request".to_string(),
            });
        }
        let mut args = vec!["merge"];
        if no_ff.unwrap_or(true) {
            args.push("--no-ff");
        }
        if let Some(m) = message {
            args.push("-m");
            args.push(m);
        }
        args.push(source_branch);
        self.run_with_retry(&args)?;
        self.run(&["rev-parse", "HEAD"])
    }

    /// Shells out to `gh pr create` when the binary is on `PATH`; skipped
    /// otherwise, returning the would-be title/body so the caller can
    /// surface it instead of failing the action.
    pub fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        base: &str,
        head: Option<&str>,
    ) -> CoordinationResult<PullRequestOutcome> {
        if which::which("gh").is_err() {
            return Ok(PullRequestOutcome { created: false, url: None, title: title.to_string(), body: body.to_string() });
        }
        let mut args = vec!["pr", "create", "--title", title, "--body", body, "--base", base];
        if let Some(h) = head {
            args.push("--head");
            args.push(h);
        }
        let output = Command::new("gh").args(&args).current_dir(&self.working_dir).output()?;
        if !output.status.success() {
            return Err(CoordinationError::Policy {
                message: format!("gh pr create: {}", String::from_utf8_lossy(&output.stderr)),
            });
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(PullRequestOutcome { created: true, url: Some(url), title: title.to_string(), body: body.to_string() })
    }

    pub fn revert(&self, shas: &[String]) -> CoordinationResult<String> {
        if shas.is_empty() {
            return Err(CoordinationError::Validation { message: "revert requires at least one commit sha".to_string() });
        }
        for sha in shas {
            self.run_with_retry(&["revert", "--no-edit", sha])?;
        }
        self.run(&["rev-parse", "HEAD"])
    }
}

/// Ensure the message ends with `Bead:`/`Agent:` trailers and the first
/// line is ≤ 72 chars.
fn build_commit_message(supplied: Option<&str>, bead_id: &str, agent_id: &str) -> String {
    let base = supplied.unwrap_or("work produced by agent").to_string();
    let mut lines: Vec<String> = base.lines().map(str::to_string).collect();
    if lines.is_empty() {
        lines.push("work produced by agent".to_string());
    }
    if lines[0].len() > 72 {
        lines[0] = lines[0].chars().take(72).collect();
    }

    let has_bead_trailer = lines.iter().any(|l| l.starts_with(&format!("Bead: {bead_id}")));
    let has_agent_trailer = lines.iter().any(|l| l.starts_with(&format!("Agent: {agent_id}")));

    if !has_bead_trailer || !has_agent_trailer {
        lines.push(String::new());
        if !has_bead_trailer {
            lines.push(format!("Bead: {bead_id}"));
        }
        if !has_agent_trailer {
            lines.push(format!("Agent: {agent_id}"));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
        ] {
            StdCommand::new("git").args(&args).current_dir(dir.path()).output().unwrap();
        }
        std::fs::write(dir.path().join("README.md"), "# test").unwrap();
        StdCommand::new("git").args(["add", "."]).current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", "initial"]).current_dir(dir.path()).output().unwrap();
        dir
    }

    #[test]
    fn checkout_bead_branch_creates_branch_off_protected() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        let branch = service.checkout_bead_branch("bd-42", "Fix login bug").unwrap();
        assert_eq!(branch, "bead/bd-42/fix-login-bug");
        assert_eq!(service.current_branch().unwrap(), branch);
    }

    #[test]
    fn checkout_bead_branch_reuses_existing_non_protected_branch() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        service.run(&["checkout", "-b", "already-working"]).unwrap();
        let branch = service.checkout_bead_branch("bd-42", "whatever").unwrap();
        assert_eq!(branch, "already-working");
    }

    #[test]
    fn commit_refused_when_gate_failed() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        service.checkout_bead_branch("bd-1", "desc").unwrap();
        let req = CommitRequest { bead_id: "bd-1", agent_id: "agent-1", message: None, files: &[], allow_all: true };
        let err = service.commit(req, false).unwrap_err();
        assert!(matches!(err, CoordinationError::Policy { .. }));
    }

    #[test]
    fn commit_auto_branches_off_protected_branch() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        assert_eq!(service.current_branch().unwrap(), "main");
        std::fs::write(dir.path().join("feature.txt"), "content").unwrap();
        let req = CommitRequest {
            bead_id: "bd-1",
            agent_id: "agent-1",
            message: Some("add feature"),
            files: &[],
            allow_all: true,
        };
        let sha = service.commit(req, true).unwrap();
        assert!(!sha.is_empty());
        assert_eq!(service.current_branch().unwrap(), "bead/bd-1/add-feature");
    }

    #[test]
    fn commit_succeeds_and_appends_trailers() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        service.checkout_bead_branch("bd-1", "desc").unwrap();
        std::fs::write(dir.path().join("feature.txt"), "content").unwrap();
        let req = CommitRequest {
            bead_id: "bd-1",
            agent_id: "agent-1",
            message: Some("add feature"),
            files: &[],
            allow_all: true,
        };
        let sha = service.commit(req, true).unwrap();
        assert!(!sha.is_empty());
        let log = service.log(None, 1).unwrap();
        assert!(log[0].message.contains("Bead: bd-1"));
        assert!(log[0].message.contains("Agent: agent-1"));
    }

    #[test]
    fn commit_rejects_secret_in_staged_diff() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        service.checkout_bead_branch("bd-1", "desc").unwrap();
        std::fs::write(dir.path().join("config.rs"), "api_key = \"AKIA1234567890ABCDEFGH12\"").unwrap();
        let req = CommitRequest { bead_id: "bd-1", agent_id: "agent-1", message: None, files: &[], allow_all: true };
        let err = service.commit(req, true).unwrap_err();
        assert!(matches!(err, CoordinationError::Policy { .. }));
    }

    #[test]
    fn force_push_is_rejected() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        let err = service.push(None, false, true).unwrap_err();
        assert!(matches!(err, CoordinationError::Policy { .. }));
    }

    #[test]
    fn merge_into_protected_branch_is_rejected() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        let err = service.merge("some-branch", None, None).unwrap_err();
        assert!(matches!(err, CoordinationError::Policy { .. }));
    }

    #[test]
    fn delete_protected_branch_is_rejected() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        let err = service.delete_branch("main", false).unwrap_err();
        assert!(matches!(err, CoordinationError::Policy { .. }));
    }

    #[test]
    fn revert_requires_at_least_one_sha() {
        let dir = init_repo();
        let service = GitService::new(dir.path(), "bead/", "proj-1");
        let err = service.revert(&[]).unwrap_err();
        assert!(matches!(err, CoordinationError::Validation { .. }));
    }
}
