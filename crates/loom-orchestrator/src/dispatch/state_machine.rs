//! Explicit dispatch states plus a transition log, grounded on the
//! teacher's `state_machine::OrchestratorState` shape (explicit states, a
//! transitions table, `is_terminal()`). Purely an observability aid: it
//! does not change the action loop's externally visible behavior, it only
//! makes one dispatch replayable from its transition log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    ParseError,
    ProgressStagnant,
    IterationBudgetExhausted,
    ProviderError,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Selecting,
    Dispatched,
    Prompting,
    Parsing,
    Acting,
    Observing,
    Terminated(TerminationReason),
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: DispatchState,
    pub to: DispatchState,
    pub at: DateTime<Utc>,
}

/// One dispatch's state plus its full transition history, so an offline
/// replay can reconstruct the exact sequence of states a bead went
/// through.
#[derive(Debug, Clone)]
pub struct DispatchStateMachine {
    current: DispatchState,
    log: Vec<Transition>,
}

impl Default for DispatchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStateMachine {
    pub fn new() -> Self {
        Self { current: DispatchState::Selecting, log: Vec::new() }
    }

    pub fn current(&self) -> &DispatchState {
        &self.current
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.log
    }

    /// No legality check: the action loop's control flow already enforces
    /// which transitions happen in which order; this just records them.
    pub fn advance(&mut self, to: DispatchState) {
        let from = std::mem::replace(&mut self.current, to.clone());
        self.log.push(Transition { from, to, at: Utc::now() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_machine_starts_selecting() {
        let sm = DispatchStateMachine::new();
        assert_eq!(*sm.current(), DispatchState::Selecting);
        assert!(!sm.current().is_terminal());
    }

    #[test]
    fn advance_appends_to_transition_log() {
        let mut sm = DispatchStateMachine::new();
        sm.advance(DispatchState::Dispatched);
        sm.advance(DispatchState::Terminated(TerminationReason::Completed));
        assert_eq!(sm.transitions().len(), 2);
        assert!(sm.current().is_terminal());
    }
}
