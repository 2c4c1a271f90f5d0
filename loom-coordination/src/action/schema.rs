//! Action catalog — a tagged union keyed on `type`, per spec §6.
//!
//! Shared envelope fields live on `ActionEnvelope`/`ActionContext`; each
//! variant only carries the fields that are meaningful for it. The router
//! is a single match over this enum, never a type hierarchy (see
//! DESIGN.md's note on capability interfaces vs. inheritance).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One or more actions plus free-form notes, as produced by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEnvelope {
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// `{ agent_id, bead_id, project_id }`, threaded through every execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionContext {
    pub agent_id: String,
    pub bead_id: String,
    pub project_id: String,
}

/// Outcome of executing one action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub action_type: String,
    pub status: ActionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ActionResult {
    pub fn executed(action_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            status: ActionStatus::Executed,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn error(action_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            status: ActionStatus::Error,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn skipped(action_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            status: ActionStatus::Skipped,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn mcp_required(action_type: impl Into<String>, tool_name: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("mcp_tool".to_string(), serde_json::Value::String(tool_name.into()));
        Self {
            action_type: action_type.into(),
            status: ActionStatus::McpRequired,
            message: "this action is delegated to an external MCP workflow".to_string(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Executed,
    Error,
    Skipped,
    McpRequired,
}

/// A single bead creation payload, nested under `create_bead`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BeadPayload {
    pub title: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(rename = "type", default)]
    pub bead_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// The action catalog from spec §6. `#[serde(tag = "type")]` makes this a
/// flat, sparse-field object on the wire — exactly the schema the LLM
/// produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    AskFollowup {
        question: String,
    },
    ReadFile {
        path: String,
    },
    ReadCode {
        path: String,
    },
    ReadTree {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        max_depth: Option<u32>,
        #[serde(default)]
        limit: Option<u32>,
    },
    SearchText {
        query: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        limit: Option<u32>,
    },
    WriteFile {
        path: String,
        content: String,
    },
    EditCode {
        path: String,
        #[serde(default)]
        old_text: Option<String>,
        #[serde(default)]
        new_text: Option<String>,
        #[serde(default)]
        patch: Option<String>,
    },
    ApplyPatch {
        patch: String,
    },
    RunCommand {
        command: String,
        #[serde(default)]
        working_dir: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    RunTests {
        #[serde(default)]
        test_pattern: Option<String>,
        #[serde(default)]
        framework: Option<String>,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    RunLinter {
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        framework: Option<String>,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    BuildProject {
        #[serde(default)]
        build_target: Option<String>,
        #[serde(default)]
        build_command: Option<String>,
        #[serde(default)]
        framework: Option<String>,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    GitStatus {},
    GitDiff {},
    GitFetch {},
    GitListBranches {},
    GitCommit {
        #[serde(default)]
        commit_message: Option<String>,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        allow_all: bool,
    },
    GitPush {
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        set_upstream: bool,
        #[serde(default)]
        force: bool,
    },
    GitCheckout {
        branch: String,
    },
    GitBranchDelete {
        branch: String,
        #[serde(default)]
        delete_remote: bool,
    },
    GitMerge {
        source_branch: String,
        #[serde(default)]
        commit_message: Option<String>,
        #[serde(default)]
        no_ff: Option<bool>,
    },
    GitRevert {
        #[serde(default)]
        commit_sha: Option<String>,
        #[serde(default)]
        commit_shas: Option<Vec<String>>,
        #[serde(default)]
        reason: Option<String>,
    },
    GitLog {
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        max_count: Option<u32>,
    },
    GitDiffBranches {
        source_branch: String,
        target_branch: String,
    },
    CreatePr {
        #[serde(default)]
        pr_title: Option<String>,
        #[serde(default)]
        pr_body: Option<String>,
        #[serde(default)]
        pr_base: Option<String>,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        pr_reviewers: Vec<String>,
    },
    FetchPr {
        pr_number: u64,
        #[serde(default)]
        include_files: bool,
        #[serde(default)]
        include_diff: bool,
        #[serde(default)]
        review_criteria: Option<String>,
    },
    ReviewCode {
        pr_number: u64,
        #[serde(default)]
        include_files: bool,
        #[serde(default)]
        include_diff: bool,
        #[serde(default)]
        review_criteria: Option<String>,
    },
    AddPrComment {
        pr_number: u64,
        comment_body: String,
        #[serde(default)]
        comment_path: Option<String>,
        #[serde(default)]
        comment_line: Option<u32>,
        #[serde(default)]
        comment_side: Option<String>,
    },
    SubmitReview {
        pr_number: u64,
        review_event: ReviewEvent,
        comment_body: String,
    },
    RequestReview {
        pr_number: u64,
        reviewer: String,
    },
    CreateBead {
        bead: BeadPayload,
    },
    CloseBead {
        bead_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    ApproveBead {
        bead_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    RejectBead {
        bead_id: String,
        reason: String,
    },
    EscalateCeo {
        bead_id: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        returned_to: Option<String>,
    },
    DelegateTask {
        delegate_to_role: String,
        task_title: String,
        #[serde(default)]
        task_description: Option<String>,
        #[serde(default)]
        task_priority: Option<i32>,
        #[serde(default)]
        parent_bead_id: Option<String>,
    },
    SendAgentMessage {
        #[serde(default)]
        to_agent_id: Option<String>,
        #[serde(default)]
        to_agent_role: Option<String>,
        message_type: MessageType,
        #[serde(default)]
        subject: Option<String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    ReadBeadConversation {
        bead_id: String,
        #[serde(default)]
        max_messages: Option<u32>,
    },
    ReadBeadContext {
        bead_id: String,
        #[serde(default)]
        max_messages: Option<u32>,
    },
    FindReferences {
        path: String,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        column: Option<u32>,
        #[serde(default)]
        language: Option<String>,
    },
    GoToDefinition {
        path: String,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        column: Option<u32>,
        #[serde(default)]
        language: Option<String>,
    },
    FindImplementations {
        path: String,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        column: Option<u32>,
        #[serde(default)]
        language: Option<String>,
    },
    // MCP-bound actions: not executed here, reported as `mcp_required`.
    StartDevelopment {},
    WhatsNext {},
    ProceedToPhase {
        #[serde(default)]
        phase: Option<String>,
    },
    ConductReview {},
    ResumeWorkflow {},
    Done {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Question,
    Delegation,
    Notification,
}

impl Action {
    /// The wire `type` discriminant, for logging and fingerprinting.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::AskFollowup { .. } => "ask_followup",
            Action::ReadFile { .. } => "read_file",
            Action::ReadCode { .. } => "read_code",
            Action::ReadTree { .. } => "read_tree",
            Action::SearchText { .. } => "search_text",
            Action::WriteFile { .. } => "write_file",
            Action::EditCode { .. } => "edit_code",
            Action::ApplyPatch { .. } => "apply_patch",
            Action::RunCommand { .. } => "run_command",
            Action::RunTests { .. } => "run_tests",
            Action::RunLinter { .. } => "run_linter",
            Action::BuildProject { .. } => "build_project",
            Action::GitStatus {} => "git_status",
            Action::GitDiff {} => "git_diff",
            Action::GitFetch {} => "git_fetch",
            Action::GitListBranches {} => "git_list_branches",
            Action::GitCommit { .. } => "git_commit",
            Action::GitPush { .. } => "git_push",
            Action::GitCheckout { .. } => "git_checkout",
            Action::GitBranchDelete { .. } => "git_branch_delete",
            Action::GitMerge { .. } => "git_merge",
            Action::GitRevert { .. } => "git_revert",
            Action::GitLog { .. } => "git_log",
            Action::GitDiffBranches { .. } => "git_diff_branches",
            Action::CreatePr { .. } => "create_pr",
            Action::FetchPr { .. } => "fetch_pr",
            Action::ReviewCode { .. } => "review_code",
            Action::AddPrComment { .. } => "add_pr_comment",
            Action::SubmitReview { .. } => "submit_review",
            Action::RequestReview { .. } => "request_review",
            Action::CreateBead { .. } => "create_bead",
            Action::CloseBead { .. } => "close_bead",
            Action::ApproveBead { .. } => "approve_bead",
            Action::RejectBead { .. } => "reject_bead",
            Action::EscalateCeo { .. } => "escalate_ceo",
            Action::DelegateTask { .. } => "delegate_task",
            Action::SendAgentMessage { .. } => "send_agent_message",
            Action::ReadBeadConversation { .. } => "read_bead_conversation",
            Action::ReadBeadContext { .. } => "read_bead_context",
            Action::FindReferences { .. } => "find_references",
            Action::GoToDefinition { .. } => "go_to_definition",
            Action::FindImplementations { .. } => "find_implementations",
            Action::StartDevelopment {} => "start_development",
            Action::WhatsNext {} => "whats_next",
            Action::ProceedToPhase { .. } => "proceed_to_phase",
            Action::ConductReview {} => "conduct_review",
            Action::ResumeWorkflow {} => "resume_workflow",
            Action::Done { .. } => "done",
        }
    }

    /// Whether this type is handled by an external MCP workflow rather than
    /// the router itself (spec §4.F).
    pub fn is_mcp_bound(&self) -> bool {
        matches!(
            self,
            Action::StartDevelopment {}
                | Action::WhatsNext {}
                | Action::ProceedToPhase { .. }
                | Action::ConductReview {}
                | Action::ResumeWorkflow {}
        )
    }

    /// Whether this action terminates the dispatch loop (spec §4.H step e).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Done { .. } | Action::CloseBead { .. })
    }

    /// A fingerprint for stagnation detection: the type plus the fields that
    /// identify *what* was acted on, deliberately excluding free-form
    /// reasoning fields like `reason`/`notes`.
    pub fn fingerprint(&self) -> String {
        match self {
            Action::ReadTree { path, .. } => {
                format!("read_tree:{}", path.as_deref().unwrap_or("."))
            }
            Action::ReadFile { path } | Action::ReadCode { path } => {
                format!("read_file:{path}")
            }
            Action::SearchText { query, path, .. } => {
                format!("search_text:{}:{}", path.as_deref().unwrap_or(""), query)
            }
            Action::RunCommand { command, .. } => format!("run_command:{command}"),
            other => other.type_name().to_string(),
        }
    }

    /// Whether this action, if it succeeds, constitutes state-changing
    /// progress for stagnation purposes (spec §4.H step f).
    pub fn is_state_changing(&self) -> bool {
        matches!(
            self,
            Action::WriteFile { .. }
                | Action::EditCode { .. }
                | Action::ApplyPatch { .. }
                | Action::GitCommit { .. }
                | Action::GitMerge { .. }
                | Action::GitRevert { .. }
                | Action::CreateBead { .. }
                | Action::CloseBead { .. }
                | Action::ApproveBead { .. }
                | Action::RejectBead { .. }
        )
    }
}
