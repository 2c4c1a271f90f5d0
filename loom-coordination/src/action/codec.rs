//! Strict → Lenient → Simple decoder staircase (spec §4.A).
//!
//! Strict is the contract: a well-formed `ActionEnvelope`, unknown fields
//! forbidden, `actions` non-empty. Lenient strips the Markdown/`<think>`
//! noise real providers wrap around JSON and re-runs Strict. Simple accepts
//! a single-action object with a small synonym table, for weaker models
//! that can't hold the full schema. Each stays a standalone decoder sharing
//! one validator rather than collapsing into a mega-parser.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Deserialize;
use serde_json::Value;

use super::schema::{Action, ActionEnvelope, BeadPayload};
use crate::error::{CoordinationError, CoordinationResult};

/// Upper bound on `actions.len()` per envelope. Not in spec.md; see
/// DESIGN.md — an unbounded envelope would let one turn bypass the
/// iteration budget in §4.H.
pub const MAX_ACTIONS_PER_ENVELOPE: usize = 8;

/// Decode a raw LLM reply into a validated envelope, trying Strict, then
/// Lenient, then Simple, in that order. Returns the original Strict error
/// if every stage fails.
pub fn decode(raw: &str) -> CoordinationResult<ActionEnvelope> {
    match decode_strict(raw) {
        Ok(envelope) => return Ok(envelope),
        Err(strict_err) => {
            if let Ok(envelope) = decode_lenient(raw) {
                return Ok(envelope);
            }
            if let Ok(action) = decode_simple(raw) {
                return Ok(ActionEnvelope { actions: vec![action], notes: None });
            }
            Err(strict_err)
        }
    }
}

/// Strict decode: JSON, `#[serde(deny_unknown_fields)]` semantics enforced
/// by a two-pass parse (serde's `deny_unknown_fields` can't compose with
/// `#[serde(tag)]` internally-tagged enums cleanly, so unknown top-level
/// envelope keys are checked by hand), non-empty `actions`, every action
/// individually validated.
pub fn decode_strict(raw: &str) -> CoordinationResult<ActionEnvelope> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| CoordinationError::Parse { message: format!("not valid JSON: {e}") })?;

    reject_unknown_envelope_keys(&value)?;

    let envelope: ActionEnvelope = serde_json::from_value(value)
        .map_err(|e| CoordinationError::Parse { message: format!("envelope schema mismatch: {e}") })?;

    if envelope.actions.is_empty() {
        return Err(CoordinationError::Validation { message: "actions must be non-empty".to_string() });
    }
    if envelope.actions.len() > MAX_ACTIONS_PER_ENVELOPE {
        return Err(CoordinationError::Validation {
            message: format!(
                "actions array has {} entries, exceeds cap of {MAX_ACTIONS_PER_ENVELOPE}",
                envelope.actions.len()
            ),
        });
    }
    for action in &envelope.actions {
        validate_action(action)?;
    }
    Ok(envelope)
}

fn reject_unknown_envelope_keys(value: &Value) -> CoordinationResult<()> {
    let Value::Object(map) = value else {
        return Err(CoordinationError::Parse { message: "envelope must be a JSON object".to_string() });
    };
    for key in map.keys() {
        if key != "actions" && key != "notes" {
            return Err(CoordinationError::Parse { message: format!("unknown envelope field `{key}`") });
        }
    }
    Ok(())
}

/// Lenient decode: strip Markdown fences, drop `<think>...</think>` blocks
/// (including an unopened closing tag, which means "everything before this
/// is thought"), extract the first balanced JSON object, and re-run Strict.
pub fn decode_lenient(raw: &str) -> CoordinationResult<ActionEnvelope> {
    let cleaned = strip_think_blocks(raw);
    let cleaned = strip_code_fences(&cleaned);
    let candidate = extract_balanced_json_object(&cleaned)
        .ok_or_else(|| CoordinationError::Parse { message: "no balanced JSON object found".to_string() })?;
    decode_strict(&candidate)
}

fn strip_think_blocks(text: &str) -> String {
    if let Some(close_idx) = text.find("</think>") {
        if let Some(open_idx) = text.find("<think>") {
            if open_idx < close_idx {
                let before = &text[..open_idx];
                let after = &text[close_idx + "</think>".len()..];
                return format!("{before}{after}");
            }
        }
        // Closing tag with no preceding opening tag: everything before it is thought.
        return text[close_idx + "</think>".len()..].to_string();
    }
    text.to_string()
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim().to_string(),
        None => rest.trim().to_string(),
    }
}

/// Extract the first balanced `{...}` span, tracking string literals and
/// backslash escapes so braces inside JSON strings don't confuse the scan.
fn extract_balanced_json_object(text: &str) -> Option<String> {
    let bytes: Vec<char> = text.chars().collect();
    let start = bytes.iter().position(|&c| c == '{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &ch) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset;
                    return Some(bytes[start..=end].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

/// Simple decode: `{ action, ...fields, notes? }`, a fixed synonym table
/// mapping short action names used by weaker models onto the real catalog.
pub fn decode_simple(raw: &str) -> CoordinationResult<Action> {
    let cleaned = strip_think_blocks(raw);
    let cleaned = strip_code_fences(&cleaned);
    let candidate = extract_balanced_json_object(&cleaned).unwrap_or(cleaned);

    let value: Value = serde_json::from_str(candidate.trim())
        .map_err(|e| CoordinationError::Parse { message: format!("not valid JSON: {e}") })?;

    let Value::Object(mut map) = value else {
        return Err(CoordinationError::Parse { message: "simple action must be a JSON object".to_string() });
    };

    let raw_action = map
        .remove("action")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| CoordinationError::Validation { message: "missing `action` field".to_string() })?;

    let canonical = canonicalize_simple_action(&raw_action).ok_or_else(|| CoordinationError::Validation {
        message: format!(
            "unknown action `{raw_action}`, allowed: {}",
            ALLOWED_SIMPLE_ACTIONS.join(", ")
        ),
    })?;

    rename_simple_aliases(&mut map, canonical);

    map.insert("type".to_string(), Value::String(canonical.to_string()));
    let value = Value::Object(map);

    let action: Action = serde_json::from_value(value)
        .map_err(|e| CoordinationError::Parse { message: format!("simple action schema mismatch: {e}") })?;
    validate_action(&action)?;
    Ok(action)
}

/// `old`/`new` → `old_text`/`new_text` for `edit_code`; other actions pass
/// their fields through unchanged.
fn rename_simple_aliases(map: &mut serde_json::Map<String, Value>, canonical: &str) {
    if canonical == "edit_code" {
        if let Some(old) = map.remove("old") {
            map.insert("old_text".to_string(), old);
        }
        if let Some(new) = map.remove("new") {
            map.insert("new_text".to_string(), new);
        }
    }
}

static SIMPLE_SYNONYMS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("scope", "read_tree"),
        ("tree", "read_tree"),
        ("read", "read_file"),
        ("search", "search_text"),
        ("edit", "edit_code"),
        ("write", "write_file"),
        ("build", "build_project"),
        ("test", "run_tests"),
        ("bash", "run_command"),
        ("done", "done"),
    ])
});

/// Action type names reachable via `decode_strict`'s `type` tag, used both
/// to validate passthrough `git_*` names and to build the error message's
/// allowed-list.
const ALLOWED_SIMPLE_ACTIONS: &[&str] = &[
    "scope", "tree", "read", "search", "edit", "write", "build", "test", "bash", "done",
    "read_tree", "read_file", "search_text", "edit_code", "write_file", "build_project",
    "run_tests", "run_command", "read_code", "apply_patch", "run_linter",
    "git_status", "git_diff", "git_fetch", "git_list_branches", "git_commit", "git_push",
    "git_checkout", "git_branch_delete", "git_merge", "git_revert", "git_log", "git_diff_branches",
    "create_pr", "fetch_pr", "review_code", "add_pr_comment", "submit_review", "request_review",
    "create_bead", "close_bead", "approve_bead", "reject_bead", "escalate_ceo", "delegate_task",
    "send_agent_message", "read_bead_conversation", "read_bead_context",
    "find_references", "go_to_definition", "find_implementations", "ask_followup",
];

fn canonicalize_simple_action(raw: &str) -> Option<&'static str> {
    if let Some(&canonical) = SIMPLE_SYNONYMS.get(raw) {
        return Some(canonical);
    }
    // git_* passthrough and any already-canonical name.
    ALLOWED_SIMPLE_ACTIONS.iter().find(|&&name| name == raw).copied()
}

/// Per-type required-field validation (spec §4.A: `read_file` requires
/// `path`; `edit_code` requires `path + (old_text+new_text) | patch`;
/// `create_bead` requires `bead.title + bead.project_id`).
fn validate_action(action: &Action) -> CoordinationResult<()> {
    match action {
        Action::ReadFile { path } | Action::ReadCode { path } if path.trim().is_empty() => {
            Err(field_required("path"))
        }
        Action::WriteFile { path, .. } if path.trim().is_empty() => Err(field_required("path")),
        Action::EditCode { path, old_text, new_text, patch } => {
            if path.trim().is_empty() {
                return Err(field_required("path"));
            }
            let has_text_pair = old_text.is_some() && new_text.is_some();
            let has_patch = patch.as_ref().is_some_and(|p| !p.trim().is_empty());
            if !has_text_pair && !has_patch {
                return Err(CoordinationError::Validation {
                    message: "edit_code requires path + (old_text + new_text) | patch".to_string(),
                });
            }
            Ok(())
        }
        Action::ApplyPatch { patch } if patch.trim().is_empty() => Err(field_required("patch")),
        Action::RunCommand { command, .. } if command.trim().is_empty() => Err(field_required("command")),
        Action::SearchText { query, .. } if query.trim().is_empty() => Err(field_required("query")),
        Action::CreateBead { bead } => validate_bead_payload(bead),
        Action::CloseBead { bead_id, .. }
        | Action::ApproveBead { bead_id, .. }
        | Action::EscalateCeo { bead_id, .. }
        | Action::ReadBeadConversation { bead_id, .. }
        | Action::ReadBeadContext { bead_id, .. }
            if bead_id.trim().is_empty() =>
        {
            Err(field_required("bead_id"))
        }
        Action::RejectBead { bead_id, reason } => {
            if bead_id.trim().is_empty() {
                return Err(field_required("bead_id"));
            }
            if reason.trim().is_empty() {
                return Err(field_required("reason"));
            }
            Ok(())
        }
        Action::GitCheckout { branch } | Action::GitBranchDelete { branch, .. } if branch.trim().is_empty() => {
            Err(field_required("branch"))
        }
        Action::GitMerge { source_branch, .. } | Action::GitDiffBranches { source_branch, .. }
            if source_branch.trim().is_empty() =>
        {
            Err(field_required("source_branch"))
        }
        Action::GitDiffBranches { target_branch, .. } if target_branch.trim().is_empty() => {
            Err(field_required("target_branch"))
        }
        Action::DelegateTask { delegate_to_role, task_title, .. } => {
            if delegate_to_role.trim().is_empty() {
                return Err(field_required("delegate_to_role"));
            }
            if task_title.trim().is_empty() {
                return Err(field_required("task_title"));
            }
            Ok(())
        }
        Action::SendAgentMessage { to_agent_id, to_agent_role, message_type, .. } => {
            if to_agent_id.is_none() && to_agent_role.is_none() {
                return Err(CoordinationError::Validation {
                    message: "send_agent_message requires to_agent_id or to_agent_role".to_string(),
                });
            }
            let _ = message_type;
            Ok(())
        }
        Action::AddPrComment { comment_body, .. } if comment_body.trim().is_empty() => {
            Err(field_required("comment_body"))
        }
        Action::SubmitReview { comment_body, .. } if comment_body.trim().is_empty() => {
            Err(field_required("comment_body"))
        }
        Action::RequestReview { reviewer, .. } if reviewer.trim().is_empty() => Err(field_required("reviewer")),
        Action::AskFollowup { question } if question.trim().is_empty() => Err(field_required("question")),
        _ => Ok(()),
    }
}

fn validate_bead_payload(bead: &BeadPayload) -> CoordinationResult<()> {
    if bead.title.trim().is_empty() {
        return Err(field_required("bead.title"));
    }
    if bead.project_id.trim().is_empty() {
        return Err(field_required("bead.project_id"));
    }
    Ok(())
}

fn field_required(field: &str) -> CoordinationError {
    CoordinationError::Validation { message: format!("{field} is required") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_decodes_well_formed_envelope() {
        let raw = r#"{"actions":[{"type":"read_file","path":"src/lib.rs"}]}"#;
        let envelope = decode_strict(raw).unwrap();
        assert_eq!(envelope.actions.len(), 1);
        assert_eq!(envelope.actions[0].type_name(), "read_file");
    }

    #[test]
    fn strict_rejects_empty_actions() {
        let raw = r#"{"actions":[]}"#;
        assert!(decode_strict(raw).is_err());
    }

    #[test]
    fn strict_rejects_unknown_envelope_field() {
        let raw = r#"{"actions":[{"type":"done"}],"bogus":1}"#;
        assert!(decode_strict(raw).is_err());
    }

    #[test]
    fn strict_rejects_envelope_over_cap() {
        let actions: Vec<String> = (0..MAX_ACTIONS_PER_ENVELOPE + 1)
            .map(|_| r#"{"type":"done"}"#.to_string())
            .collect();
        let raw = format!(r#"{{"actions":[{}]}}"#, actions.join(","));
        let err = decode_strict(&raw).unwrap_err();
        assert!(matches!(err, CoordinationError::Validation { .. }));
    }

    #[test]
    fn lenient_strips_code_fence() {
        let raw = "```json\n{\"actions\":[{\"type\":\"done\"}]}\n```";
        let envelope = decode_lenient(raw).unwrap();
        assert_eq!(envelope.actions[0].type_name(), "done");
    }

    #[test]
    fn lenient_strips_think_block_with_opening_tag() {
        let raw = "<think>let me plan this out</think>{\"actions\":[{\"type\":\"done\"}]}";
        let envelope = decode_lenient(raw).unwrap();
        assert_eq!(envelope.actions.len(), 1);
    }

    #[test]
    fn lenient_strips_unopened_think_close_tag() {
        let raw = "reasoning reasoning reasoning</think>{\"actions\":[{\"type\":\"done\"}]}";
        let envelope = decode_lenient(raw).unwrap();
        assert_eq!(envelope.actions.len(), 1);
    }

    #[test]
    fn lenient_extracts_balanced_object_with_braces_in_strings() {
        let raw = "noise before {\"actions\":[{\"type\":\"write_file\",\"path\":\"a.rs\",\"content\":\"fn f() { {} }\"}]} trailing";
        let envelope = decode_lenient(raw).unwrap();
        match &envelope.actions[0] {
            Action::WriteFile { content, .. } => assert!(content.contains('{')),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn lenient_is_idempotent() {
        let raw = "```json\n{\"actions\":[{\"type\":\"done\"}]}\n```";
        let once = decode_lenient(raw).unwrap();
        let serialized = serde_json::to_string(&once).unwrap();
        let twice = decode_lenient(&serialized).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn simple_maps_synonym_and_renames_edit_fields() {
        let raw = r#"{"action":"edit","path":"a.rs","old":"foo","new":"bar"}"#;
        let action = decode_simple(raw).unwrap();
        match action {
            Action::EditCode { old_text, new_text, .. } => {
                assert_eq!(old_text.as_deref(), Some("foo"));
                assert_eq!(new_text.as_deref(), Some("bar"));
            }
            other => panic!("expected edit_code, got {other:?}"),
        }
    }

    #[test]
    fn simple_passes_through_git_actions() {
        let raw = r#"{"action":"git_status"}"#;
        let action = decode_simple(raw).unwrap();
        assert_eq!(action.type_name(), "git_status");
    }

    #[test]
    fn simple_rejects_unknown_action_with_allowed_list() {
        let raw = r#"{"action":"teleport"}"#;
        let err = decode_simple(raw).unwrap_err();
        match err {
            CoordinationError::Validation { message } => assert!(message.contains("allowed:")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn decode_falls_through_all_three_stages() {
        let raw = "garbage ```json\n{\"action\":\"bash\",\"command\":\"ls\"}\n``` more garbage";
        let envelope = decode(raw).unwrap();
        assert_eq!(envelope.actions[0].type_name(), "run_command");
    }

    #[test]
    fn decode_returns_strict_error_when_all_stages_fail() {
        let err = decode("not json at all, no braces").unwrap_err();
        assert!(matches!(err, CoordinationError::Parse { .. }));
    }

    #[test]
    fn validate_edit_code_requires_patch_or_text_pair() {
        let raw = r#"{"actions":[{"type":"edit_code","path":"a.rs"}]}"#;
        assert!(decode_strict(raw).is_err());
    }

    #[test]
    fn validate_create_bead_requires_title_and_project() {
        let raw = r#"{"actions":[{"type":"create_bead","bead":{"title":"","project_id":""}}]}"#;
        assert!(decode_strict(raw).is_err());
    }

    #[test]
    fn snapshot_strict_envelope_shape() {
        let raw = r#"{"actions":[{"type":"edit_code","path":"a.rs","old_text":"foo","new_text":"bar"}],"notes":"done"}"#;
        let envelope = decode_strict(raw).unwrap();
        insta::assert_debug_snapshot!(envelope, @r#"
        ActionEnvelope {
            actions: [
                EditCode {
                    path: "a.rs",
                    old_text: Some(
                        "foo",
                    ),
                    new_text: Some(
                        "bar",
                    ),
                    patch: None,
                },
            ],
            notes: Some(
                "done",
            ),
        }
        "#);
    }

    #[test]
    fn snapshot_lenient_envelope_shape() {
        let raw = "```json\n{\"actions\":[{\"type\":\"run_tests\"}]}\n```";
        let envelope = decode_lenient(raw).unwrap();
        insta::assert_debug_snapshot!(envelope, @r#"
        ActionEnvelope {
            actions: [
                RunTests {
                    test_pattern: None,
                    framework: None,
                    timeout_seconds: None,
                },
            ],
            notes: None,
        }
        "#);
    }

    #[test]
    fn snapshot_simple_action_shape() {
        let raw = r#"{"action":"read_file","path":"README.md"}"#;
        let action = decode_simple(raw).unwrap();
        insta::assert_debug_snapshot!(action, @r#"
        ReadFile {
            path: "README.md",
        }
        "#);
    }
}
