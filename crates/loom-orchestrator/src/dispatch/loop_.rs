//! The dispatcher's action loop (spec §4.H): one loop per (bead, agent)
//! dispatch, driving provider → parse → route → observe until a terminal
//! action, a parse failure, stagnation, or the iteration budget runs out.

use loom_coordination::action::{decode, ActionContext, ActionEnvelope};
use loom_coordination::feedback::format_observation;
use loom_coordination::Action;

use crate::dispatch::provider::{ActionProvider, ConversationMessage};
use crate::dispatch::stagnation::StagnationTracker;
use crate::dispatch::state_machine::{DispatchState, DispatchStateMachine, TerminationReason};
use crate::model::{Agent, Bead, BeadStore};
use crate::router::{auto_file_parse_failure, Router};

pub const DEFAULT_ITERATION_BUDGET: u32 = 25;
pub const MAX_ITERATION_BUDGET: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    ParseError,
    ProgressStagnant,
    IterationBudgetExhausted,
}

impl DispatchOutcome {
    pub fn as_block_reason(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ParseError => "parse_error",
            Self::ProgressStagnant => "progress_stagnant",
            Self::IterationBudgetExhausted => "iteration_budget_exhausted",
        }
    }
}

pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub iterations_run: u32,
    pub produced_commits: bool,
    pub state_machine: DispatchStateMachine,
}

fn system_prompt(bead: &Bead, working_dir: &str) -> String {
    format!(
        "You are operating bead `{}`: {}\n\n\
         Respond with a single JSON object: either `{{\"actions\": [...], \"notes\": \"...\"}}` \
         or, for weaker-model compatibility, a single action object directly. \
         Call `done` when the bead is complete.\n\n\
         Working directory: {working_dir}",
        bead.id, bead.title
    )
}

/// Runs one bead's action loop to completion against `router`, using
/// `provider` for each turn. Iteration budget is clamped to
/// `[1, MAX_ITERATION_BUDGET]`.
pub async fn run_dispatch_loop(
    bead: &mut Bead,
    agent: &Agent,
    router: &Router<'_>,
    provider: &dyn ActionProvider,
    working_dir: &str,
    iteration_budget: u32,
) -> DispatchReport {
    let budget = iteration_budget.clamp(1, MAX_ITERATION_BUDGET);
    let mut sm = DispatchStateMachine::new();
    sm.advance(DispatchState::Dispatched);

    let ctx = ActionContext { agent_id: agent.id.clone(), bead_id: bead.id.clone(), project_id: bead.project_id.clone() };

    let mut conversation = vec![ConversationMessage::system(system_prompt(bead, working_dir))];
    let mut stagnation = StagnationTracker::new();
    let mut produced_commits = false;
    let mut iterations_run = 0;

    for _ in 0..budget {
        iterations_run += 1;
        sm.advance(DispatchState::Prompting);

        let raw = match provider.complete(&conversation).await {
            Ok(text) => text,
            Err(e) => {
                conversation.push(ConversationMessage::user(format!("provider error: {e}; please retry")));
                continue;
            }
        };
        conversation.push(ConversationMessage::assistant(raw.clone()));

        sm.advance(DispatchState::Parsing);
        let envelope: ActionEnvelope = match decode(&raw) {
            Ok(envelope) => envelope,
            Err(parse_err) => {
                auto_file_parse_failure(router.beads, &bead.project_id, &parse_err.to_string(), &raw, true);
                sm.advance(DispatchState::Terminated(TerminationReason::ParseError));
                return DispatchReport { outcome: DispatchOutcome::ParseError, iterations_run, produced_commits, state_machine: sm };
            }
        };

        // Step c: single-action-per-turn execution, even though an
        // envelope may carry up to MAX_ACTIONS_PER_ENVELOPE entries.
        let Some(action) = envelope.actions.first() else {
            conversation.push(ConversationMessage::user("no action was supplied; emit one action"));
            continue;
        };

        sm.advance(DispatchState::Acting);
        let result = router.execute(&ctx, &ActionEnvelope { actions: vec![action.clone()], notes: None }).await;
        let result = result.into_iter().next().expect("single-action envelope yields one result");

        if matches!(action, Action::GitCommit { .. }) && result.status == loom_coordination::ActionStatus::Executed {
            produced_commits = true;
        }

        sm.advance(DispatchState::Observing);
        conversation.push(ConversationMessage::user(format_observation(&result, working_dir)));

        if action.is_terminal() {
            sm.advance(DispatchState::Terminated(TerminationReason::Completed));
            return DispatchReport { outcome: DispatchOutcome::Completed, iterations_run, produced_commits, state_machine: sm };
        }

        if stagnation.record(action) {
            sm.advance(DispatchState::Terminated(TerminationReason::ProgressStagnant));
            return DispatchReport { outcome: DispatchOutcome::ProgressStagnant, iterations_run, produced_commits, state_machine: sm };
        }

        if stagnation.check_scope_loop(action) {
            conversation.push(ConversationMessage::user(
                "you have scanned this path three times in a row; stop reading and take an action",
            ));
        }

        sm.advance(DispatchState::Prompting);
    }

    sm.advance(DispatchState::Terminated(TerminationReason::IterationBudgetExhausted));
    DispatchReport { outcome: DispatchOutcome::IterationBudgetExhausted, iterations_run, produced_commits, state_machine: sm }
}

/// Step 5's exit synthesis: if the loop produced commits but the agent
/// never called `done`, close the bead as "work produced" with a
/// synthesized message instead of leaving it dangling `in_progress`.
pub fn synthesize_exit(bead: &mut Bead, report: &DispatchReport, beads: &dyn BeadStore) {
    match report.outcome {
        DispatchOutcome::Completed => {}
        _ if report.produced_commits => {
            bead.close(true);
            bead.last_run_error = Some(format!("auto-closed: {}", report.outcome.as_block_reason()));
            let _ = beads.save(bead);
        }
        _ => {
            bead.last_run_error = Some(report.outcome.as_block_reason().to_string());
            let _ = beads.save(bead);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentRole, InMemoryBeadStore};
    use crate::router::backend::{LocalFileOps, LocalGitOps};
    use async_trait::async_trait;
    use loom_coordination::git::GitService;

    struct DoneImmediately;

    #[async_trait]
    impl ActionProvider for DoneImmediately {
        async fn complete(&self, _messages: &[ConversationMessage]) -> crate::error::OrchestratorResult<String> {
            Ok(r#"{"actions":[{"type":"done","reason":"test"}]}"#.to_string())
        }
    }

    #[tokio::test]
    async fn loop_terminates_on_done_action() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();
        for args in [vec!["init", "-b", "main"]] {
            std::process::Command::new("git").args(&args).current_dir(dir.path()).output().unwrap();
        }

        let file_ops = LocalFileOps::new(dir.path());
        let git_service = GitService::new(dir.path(), "bead/", "proj-1");
        let git_ops = LocalGitOps { service: GitService::new(dir.path(), "bead/", "proj-1") };
        let beads = InMemoryBeadStore::new();
        let router = Router { file_ops: &file_ops, git_ops: &git_ops, git_service: &git_service, beads: &beads };

        let mut bead = Bead::new("b1", "test bead", "proj-1");
        let agent = Agent::new("a1", AgentRole::Coder, "proj-1");

        let report = run_dispatch_loop(&mut bead, &agent, &router, &DoneImmediately, dir.path().to_str().unwrap(), 5).await;
        assert_eq!(report.outcome, DispatchOutcome::Completed);
        assert_eq!(report.iterations_run, 1);
    }
}
