//! Per-action-type observation formatting (spec §4.G): transforms an
//! `ActionResult` into the next user turn's Markdown block.

use crate::action::{ActionResult, ActionStatus};

use super::hints::remediation_hints;
use super::truncate::{truncate_bytes, truncate_build_output, COMMAND_STREAM_LIMIT, FILE_CONTENT_LIMIT};

/// The action types whose result content is build/test/lint output and
/// therefore gets the error-line-extraction truncation instead of a plain
/// byte cap.
const BUILD_OUTPUT_ACTIONS: &[&str] = &["build_project", "run_tests", "run_linter"];

/// The action types whose result content is a raw command stream.
const COMMAND_STREAM_ACTIONS: &[&str] = &["run_command"];

/// The action types whose result content is file content.
const FILE_CONTENT_ACTIONS: &[&str] = &["read_file", "read_code", "write_file"];

pub fn format_observation(result: &ActionResult, working_dir: &str) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {} — {}\n\n", result.action_type, status_header(result.status)));

    let body = render_body(result);
    block.push_str(&body);
    block.push('\n');

    for (key, value) in &result.metadata {
        if key == "content" {
            continue; // already rendered in the body
        }
        block.push_str(&format!("- {key}: {value}\n"));
    }

    if result.status == ActionStatus::Error {
        let hints = remediation_hints(&result.message);
        for hint in hints {
            block.push_str(&format!("\n{hint}\n"));
        }
    }

    block.push_str(&format!("\n_working directory: {working_dir}_\n"));
    block
}

fn status_header(status: ActionStatus) -> &'static str {
    match status {
        ActionStatus::Executed => "OK",
        ActionStatus::Error => "ERROR",
        ActionStatus::Skipped => "SKIPPED",
        ActionStatus::McpRequired => "DELEGATED",
    }
}

fn render_body(result: &ActionResult) -> String {
    if FILE_CONTENT_ACTIONS.contains(&result.action_type.as_str()) {
        return render_fenced(&truncate_bytes(&result.message, FILE_CONTENT_LIMIT));
    }
    if BUILD_OUTPUT_ACTIONS.contains(&result.action_type.as_str()) {
        return render_fenced(&truncate_build_output(&result.message));
    }
    if COMMAND_STREAM_ACTIONS.contains(&result.action_type.as_str()) {
        return render_fenced(&truncate_bytes(&result.message, COMMAND_STREAM_LIMIT));
    }
    result.message.clone()
}

fn render_fenced(content: &str) -> String {
    format!("```\n{content}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionResult;

    #[test]
    fn ok_result_renders_status_header() {
        let result = ActionResult::executed("read_file", "fn main() {}");
        let block = format_observation(&result, "/workspace");
        assert!(block.contains("read_file — OK"));
        assert!(block.contains("fn main()"));
    }

    #[test]
    fn error_result_includes_remediation_hint() {
        let result = ActionResult::error("edit_code", "old_text not found in src/lib.rs");
        let block = format_observation(&result, "/workspace");
        assert!(block.contains("ERROR"));
        assert!(block.contains("re-read"));
    }

    #[test]
    fn appends_working_directory_reminder() {
        let result = ActionResult::executed("done", "finished");
        let block = format_observation(&result, "/workspace/project");
        assert!(block.contains("working directory: /workspace/project"));
    }

    #[test]
    fn mcp_required_renders_delegated_header() {
        let result = ActionResult::mcp_required("whats_next", "progress-tracker");
        let block = format_observation(&result, "/workspace");
        assert!(block.contains("DELEGATED"));
    }

    #[test]
    fn build_output_uses_error_line_extraction() {
        let mut lines: Vec<String> = (0..2000).map(|i| format!("step {i}")).collect();
        lines.push("error: something broke".to_string());
        let result = ActionResult::error("build_project", &lines.join("\n"));
        let block = format_observation(&result, "/workspace");
        assert!(block.contains("error: something broke"));
        assert!(!block.contains("step 0\n"));
    }
}
