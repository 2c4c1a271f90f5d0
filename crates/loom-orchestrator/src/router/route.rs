//! `Execute(ctx, envelope, action_context) -> [results]` (spec §4.F): a
//! single match over `loom_coordination::Action`, translating each
//! variant into a `FileOps`/`GitOps` call or a `BeadStore` mutation and
//! producing an `ActionResult`. Backend selection (sandbox vs. local) is
//! the caller's job — `Router::new` is handed whichever `FileOps`/`GitOps`
//! pair `get_ready_sandbox` resolved to, per spec's "single helper
//! returns the ready sandbox agent or nil" framing.

use loom_coordination::action::{Action, ActionContext, ActionEnvelope, ActionResult, BeadPayload};
use loom_coordination::git::{is_protected_branch, GitService};
use loom_coordination::policy::{self, GateInvocation, MissingToolchainPolicy};
use loom_coordination::CoordinationError;

use crate::model::{Bead, BeadStore, BeadType};
use crate::router::backend::{FileOps, GitOps};

/// `delegate_task`'s priority clamp (spec §4.F default policies).
fn clamp_priority(raw: Option<i32>) -> u8 {
    match raw {
        None => 2,
        Some(p) if p < 0 => 0,
        Some(p) if p > 4 => 2,
        Some(p) => p as u8,
    }
}

fn bead_type_from_str(raw: Option<&str>) -> BeadType {
    match raw {
        Some("bug") => BeadType::Bug,
        Some("decision") => BeadType::Decision,
        Some("task") | None => BeadType::Task,
        Some(other) => BeadType::Other(other.to_string()),
    }
}

/// Wires the backends and bead store a single `Execute` call needs.
/// `git_service` is always the local repository handle: several git
/// actions (checkout, merge, revert, branch management, PR creation)
/// have no sandbox RPC analog, so they run against the project's local
/// checkout regardless of which backend served `file_ops`/`git_ops`.
pub struct Router<'a> {
    pub file_ops: &'a dyn FileOps,
    pub git_ops: &'a dyn GitOps,
    pub git_service: &'a GitService,
    pub beads: &'a dyn BeadStore,
}

impl<'a> Router<'a> {
    pub async fn execute(&self, ctx: &ActionContext, envelope: &ActionEnvelope) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(envelope.actions.len());
        for action in &envelope.actions {
            results.push(self.dispatch(ctx, action).await);
        }
        results
    }

    async fn dispatch(&self, ctx: &ActionContext, action: &Action) -> ActionResult {
        let type_name = action.type_name();

        if action.is_mcp_bound() {
            return ActionResult::mcp_required(type_name, mcp_tool_name(action));
        }

        match action {
            Action::AskFollowup { question } => ActionResult::executed(type_name, format!("follow-up recorded: {question}")),

            Action::ReadFile { path } | Action::ReadCode { path } => match self.file_ops.read_file(path).await {
                Ok(content) => ActionResult::executed(type_name, content).with_metadata("path", path.clone()),
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::ReadTree { path, max_depth, limit } => {
                let resolved_path = path.as_deref().unwrap_or(".");
                let depth = max_depth.unwrap_or(2);
                match self.file_ops.read_tree(resolved_path, depth).await {
                    Ok(mut entries) => {
                        if let Some(limit) = limit {
                            entries.truncate(*limit as usize);
                        }
                        ActionResult::executed(type_name, entries.join("\n"))
                    }
                    Err(e) => ActionResult::error(type_name, e.to_string()),
                }
            }

            Action::SearchText { query, path, limit } => match self.file_ops.search_text(query, path.as_deref()).await {
                Ok(mut hits) => {
                    if let Some(limit) = limit {
                        hits.truncate(*limit as usize);
                    }
                    ActionResult::executed(type_name, hits.join("\n"))
                }
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::WriteFile { path, content } => match self.file_ops.write_file(path, content).await {
                Ok(()) => ActionResult::executed(type_name, format!("wrote {} bytes to {path}", content.len())),
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::EditCode { path, old_text, new_text, patch } => {
                if let (Some(old), Some(new)) = (old_text, new_text) {
                    match self.file_ops.edit_code(path, old, new).await {
                        Ok((true, strategy)) => ActionResult::executed(type_name, format!("matched via {strategy}")),
                        Ok((false, _)) => ActionResult::error(type_name, format!("old_text not found in {path}")),
                        Err(e) => ActionResult::error(type_name, e.to_string()),
                    }
                } else if let Some(patch) = patch {
                    match self.file_ops.apply_patch(patch).await {
                        Ok(paths) => ActionResult::executed(type_name, paths.join("\n")),
                        Err(e) => ActionResult::error(type_name, e.to_string()),
                    }
                } else {
                    ActionResult::error(type_name, "edit_code requires old_text+new_text or patch")
                }
            }

            Action::ApplyPatch { patch } => match self.file_ops.apply_patch(patch).await {
                Ok(paths) => ActionResult::executed(type_name, paths.join("\n")),
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::RunCommand { command, working_dir, .. } => {
                self.run_and_format(type_name, command, working_dir.as_deref(), 120).await
            }

            Action::RunTests { test_pattern, timeout_seconds, .. } => {
                let command = test_pattern.clone().unwrap_or_else(|| "cargo test".to_string());
                self.run_and_format(type_name, &command, None, timeout_seconds.unwrap_or(300)).await
            }

            Action::RunLinter { files, timeout_seconds, .. } => {
                let command = if files.is_empty() { "cargo clippy".to_string() } else { format!("cargo clippy -- {}", files.join(" ")) };
                self.run_and_format(type_name, &command, None, timeout_seconds.unwrap_or(120)).await
            }

            Action::BuildProject { build_command, timeout_seconds, .. } => {
                let command = build_command.clone().unwrap_or_else(|| "cargo build".to_string());
                self.run_and_format(type_name, &command, None, timeout_seconds.unwrap_or(300)).await
            }

            Action::GitStatus {} => match self.git_ops.status().await {
                Ok(output) => ActionResult::executed(type_name, output),
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::GitDiff {} => match self.git_ops.diff().await {
                Ok(output) => ActionResult::executed(type_name, output),
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::GitFetch {} => self.local_git_result(type_name, self.git_service.fetch()),

            Action::GitListBranches {} => match self.git_service.list_branches() {
                Ok(branches) => ActionResult::executed(type_name, branches.join("\n")),
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::GitCommit { commit_message, .. } => self.run_git_commit(ctx, type_name, commit_message.as_deref()).await,

            Action::GitPush { branch, .. } => {
                let branch = branch.clone().unwrap_or_default();
                match self.git_ops.push(&branch).await {
                    Ok(()) => ActionResult::executed(type_name, format!("pushed {branch}")),
                    Err(e) => ActionResult::error(type_name, e.to_string()),
                }
            }

            Action::GitCheckout { branch } => {
                self.local_git_unit_result(type_name, self.git_service.checkout(branch), &format!("checked out {branch}"))
            }

            Action::GitBranchDelete { branch, delete_remote } => self.local_git_unit_result(
                type_name,
                self.git_service.delete_branch(branch, *delete_remote),
                &format!("deleted branch {branch}"),
            ),

            Action::GitMerge { source_branch, commit_message, no_ff } => {
                let no_ff = no_ff.unwrap_or(true);
                self.local_git_result(type_name, self.git_service.merge(source_branch, commit_message.as_deref(), Some(no_ff)))
            }

            Action::GitRevert { commit_sha, commit_shas, .. } => {
                let shas: Vec<String> = commit_shas.clone().unwrap_or_else(|| commit_sha.iter().cloned().collect());
                self.local_git_result(type_name, self.git_service.revert(&shas))
            }

            Action::GitLog { branch, max_count } => match self.git_service.log(branch.as_deref(), max_count.unwrap_or(20)) {
                Ok(entries) => {
                    let body = entries.iter().map(|e| format!("{} {}", e.hash, e.message)).collect::<Vec<_>>().join("\n");
                    ActionResult::executed(type_name, body)
                }
                Err(e) => ActionResult::error(type_name, e.to_string()),
            },

            Action::GitDiffBranches { source_branch, target_branch } => {
                match self.git_service.diff_branches(source_branch, target_branch) {
                    Ok(diff) => ActionResult::executed(type_name, diff),
                    Err(e) => ActionResult::error(type_name, e.to_string()),
                }
            }

            Action::CreatePr { pr_title, pr_body, pr_base, branch, .. } => {
                let title = pr_title.clone().unwrap_or_else(|| format!("[{}] changes", ctx.bead_id));
                let body = pr_body.clone().unwrap_or_else(|| format!("Bead: {}\nAgent: {}", ctx.bead_id, ctx.agent_id));
                let base = pr_base.clone().unwrap_or_else(|| "main".to_string());
                match self.git_service.create_pull_request(&title, &body, &base, branch.as_deref()) {
                    Ok(outcome) if outcome.created => {
                        ActionResult::executed(type_name, outcome.url.unwrap_or_default())
                    }
                    Ok(outcome) => ActionResult::skipped(type_name, format!("gh not on PATH; would create: {}", outcome.title)),
                    Err(e) => ActionResult::error(type_name, e.to_string()),
                }
            }

            // PR review actions need a forge client this core does not own
            // (spec §1 non-goal: "no GitHub/GitLab API client"); surfaced
            // as skipped so the conversation can move on instead of stalling.
            Action::FetchPr { .. }
            | Action::ReviewCode { .. }
            | Action::AddPrComment { .. }
            | Action::SubmitReview { .. }
            | Action::RequestReview { .. } => {
                ActionResult::skipped(type_name, "forge API integration is outside this core; wire a PR client at the call site")
            }

            Action::CreateBead { bead } => self.create_bead(type_name, bead),

            Action::CloseBead { bead_id, .. } | Action::ApproveBead { bead_id, .. } => match self.beads.get(bead_id) {
                Some(mut bead) => {
                    bead.close(true);
                    match self.beads.save(&bead) {
                        Ok(()) => ActionResult::executed(type_name, format!("closed {bead_id}")),
                        Err(e) => ActionResult::error(type_name, e.to_string()),
                    }
                }
                None => ActionResult::error(type_name, format!("bead {bead_id} not found")),
            },

            Action::RejectBead { bead_id, reason } => match self.beads.get(bead_id) {
                Some(mut bead) => {
                    bead.close(false);
                    match self.beads.save(&bead) {
                        Ok(()) => ActionResult::executed(type_name, format!("rejected {bead_id}: {reason}")),
                        Err(e) => ActionResult::error(type_name, e.to_string()),
                    }
                }
                None => ActionResult::error(type_name, format!("bead {bead_id} not found")),
            },

            Action::EscalateCeo { bead_id, reason, .. } => {
                let escalation = Bead::new(format!("{bead_id}-escalation"), reason.clone().unwrap_or_else(|| "escalated".to_string()), ctx.project_id.clone());
                let mut escalation = escalation;
                escalation.bead_type = BeadType::Decision;
                escalation.priority = 0;
                escalation.parent_bead_id = Some(bead_id.clone());
                match self.beads.save(&escalation) {
                    Ok(()) => ActionResult::executed(type_name, escalation.id),
                    Err(e) => ActionResult::error(type_name, e.to_string()),
                }
            }

            Action::DelegateTask { delegate_to_role, task_title, task_description, task_priority, parent_bead_id } => {
                let id = format!("{}-{}", ctx.bead_id, slug(task_title));
                let mut bead = Bead::new(id.clone(), task_title.clone(), ctx.project_id.clone());
                bead.description = task_description.clone().unwrap_or_default();
                bead.priority = clamp_priority(*task_priority);
                bead.parent_bead_id = Some(parent_bead_id.clone().unwrap_or_else(|| ctx.bead_id.clone()));
                match self.beads.save(&bead) {
                    Ok(()) => ActionResult::executed(type_name, id).with_metadata("delegate_to_role", delegate_to_role.clone()),
                    Err(e) => ActionResult::error(type_name, e.to_string()),
                }
            }

            // Inter-agent messaging, conversation history and code-nav
            // actions have no deterministic core implementation (spec §1
            // non-goal: "no symbol index/LSP, no message bus payload
            // delivery") — acknowledged, not executed.
            Action::SendAgentMessage { .. }
            | Action::ReadBeadConversation { .. }
            | Action::ReadBeadContext { .. }
            | Action::FindReferences { .. }
            | Action::GoToDefinition { .. }
            | Action::FindImplementations { .. } => {
                ActionResult::skipped(type_name, "requires a capability outside this core (messaging bus or symbol index)")
            }

            Action::Done { reason } => ActionResult::executed(type_name, reason.clone().unwrap_or_else(|| "done".to_string())),

            Action::StartDevelopment {}
            | Action::WhatsNext {}
            | Action::ProceedToPhase { .. }
            | Action::ConductReview {}
            | Action::ResumeWorkflow {} => unreachable!("handled by the is_mcp_bound guard above"),
        }
    }

    /// Runs the build quality gate (spec §3, §8), commits only if it
    /// passes, auto-branches off a protected branch as a side effect of
    /// the commit (handled inside `GitService::commit`), then auto-pushes
    /// and auto-opens a PR against `main` when the commit landed on a
    /// non-protected branch (spec §4.F, §8 "Auto-PR").
    async fn run_git_commit(&self, ctx: &ActionContext, type_name: &str, commit_message: Option<&str>) -> ActionResult {
        let message = commit_message.unwrap_or("work produced by agent");

        let started = std::time::Instant::now();
        let gate_report = match self.file_ops.run_command("cargo build", None, 300).await {
            Ok((_, stderr, exit_code)) => {
                let invocation = GateInvocation {
                    exit_code: Some(exit_code),
                    duration: started.elapsed(),
                    stderr_excerpt: if stderr.is_empty() { None } else { Some(stderr) },
                };
                policy::evaluate(invocation, None, None, MissingToolchainPolicy::default())
            }
            Err(e) => return ActionResult::error(type_name, format!("build gate could not run: {e}")),
        };

        if !gate_report.commit_allowed() {
            return ActionResult::error(type_name, "quality gate did not pass; commit refused").with_metadata("gate", format!("{:?}", gate_report.gates));
        }

        let sha = match self.git_ops.commit(ctx, message, true).await {
            Ok(sha) => sha,
            Err(e) => return ActionResult::error(type_name, e.to_string()),
        };
        let mut result = ActionResult::executed(type_name, sha);

        let branch = match self.git_service.current_branch() {
            Ok(branch) => branch,
            Err(e) => return result.with_metadata("push", format!("could not determine branch: {e}")),
        };
        if is_protected_branch(&branch) {
            return result;
        }

        match self.git_ops.push(&branch).await {
            Ok(()) => result = result.with_metadata("pushed_branch", branch.clone()),
            Err(e) => return result.with_metadata("push_error", e.to_string()),
        }

        let title = format!("[{}] {}", ctx.bead_id, message.lines().next().unwrap_or(message));
        let body = format!("Bead: {}\nAgent: {}\n\n{}", ctx.bead_id, ctx.agent_id, message);
        match self.git_service.create_pull_request(&title, &body, "main", Some(&branch)) {
            Ok(outcome) if outcome.created => result = result.with_metadata("pr_url", outcome.url.unwrap_or_default()),
            Ok(outcome) => result = result.with_metadata("pr_skipped", format!("gh not on PATH; would create: {}", outcome.title)),
            Err(e) => result = result.with_metadata("pr_error", e.to_string()),
        }
        result
    }

    async fn run_and_format(&self, type_name: &str, command: &str, working_dir: Option<&str>, timeout_s: u64) -> ActionResult {
        match self.file_ops.run_command(command, working_dir, timeout_s).await {
            Ok((stdout, stderr, exit_code)) => {
                let result = ActionResult::executed(type_name, stdout)
                    .with_metadata("exit_code", exit_code)
                    .with_metadata("stderr", stderr);
                if exit_code == 0 {
                    result
                } else {
                    ActionResult { status: loom_coordination::action::ActionStatus::Error, ..result }
                }
            }
            Err(e) => ActionResult::error(type_name, e.to_string()),
        }
    }

    fn local_git_result(&self, type_name: &str, result: Result<String, CoordinationError>) -> ActionResult {
        match result {
            Ok(output) => ActionResult::executed(type_name, output),
            Err(e) => ActionResult::error(type_name, e.to_string()),
        }
    }

    fn local_git_unit_result(&self, type_name: &str, result: Result<(), CoordinationError>, message: &str) -> ActionResult {
        match result {
            Ok(()) => ActionResult::executed(type_name, message),
            Err(e) => ActionResult::error(type_name, e.to_string()),
        }
    }

    fn create_bead(&self, type_name: &str, payload: &BeadPayload) -> ActionResult {
        let id = format!("bd-{}", slug(&payload.title));
        let mut bead = Bead::new(id.clone(), payload.title.clone(), payload.project_id.clone());
        bead.description = payload.description.clone().unwrap_or_default();
        bead.priority = payload.priority.map(clamp_priority_raw).unwrap_or(2);
        bead.bead_type = bead_type_from_str(payload.bead_type.as_deref());
        match self.beads.save(&bead) {
            Ok(()) => ActionResult::executed(type_name, id),
            Err(e) => ActionResult::error(type_name, e.to_string()),
        }
    }
}

fn clamp_priority_raw(p: i32) -> u8 {
    clamp_priority(Some(p))
}

fn slug(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn mcp_tool_name(action: &Action) -> &'static str {
    match action {
        Action::StartDevelopment {} => "start_development",
        Action::WhatsNext {} => "whats_next",
        Action::ProceedToPhase { .. } => "proceed_to_phase",
        Action::ConductReview {} => "conduct_review",
        Action::ResumeWorkflow {} => "resume_workflow",
        _ => "unknown",
    }
}

/// Given raw LLM text that failed to parse as any of Strict/Lenient/Simple,
/// file a P0 bug bead carrying the parse error and the raw text (spec
/// §4.F `AutoFileParseFailure`). Returns the new bead's id.
pub fn auto_file_parse_failure(beads: &dyn BeadStore, project_id: &str, parse_error: &str, raw_text: &str, default_p0: bool) -> String {
    let id = format!("bd-parse-failure-{}", slug(parse_error));
    let mut bead = Bead::new(id.clone(), "LLM response failed to parse".to_string(), project_id.to_string());
    bead.bead_type = BeadType::Bug;
    bead.priority = if default_p0 { 0 } else { 2 };
    bead.description = format!("parse error: {parse_error}\n\nraw text:\n{raw_text}");
    let _ = beads.save(&bead);
    id
}
