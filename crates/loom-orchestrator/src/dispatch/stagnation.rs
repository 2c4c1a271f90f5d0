//! Stagnation and scope-loop checks run after each action (spec §4.H
//! steps f, g).

use std::collections::VecDeque;

use loom_coordination::Action;

const WINDOW: usize = 5;
const REPEAT_THRESHOLD: usize = 3;
const SCOPE_LOOP_THRESHOLD: usize = 3;

/// Rolling window of observation fingerprints plus the running count of
/// consecutive same-path `read_tree` calls.
#[derive(Debug, Default)]
pub struct StagnationTracker {
    window: VecDeque<(String, bool)>,
    scope_loop_path: Option<String>,
    scope_loop_count: usize,
}

impl StagnationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one executed action and reports whether the loop should
    /// abort as stagnant.
    pub fn record(&mut self, action: &Action) -> bool {
        let fingerprint = action.fingerprint();
        let state_changing = action.is_state_changing();

        self.window.push_back((fingerprint.clone(), state_changing));
        if self.window.len() > WINDOW {
            self.window.pop_front();
        }

        if state_changing {
            return false;
        }

        let repeats = self.window.iter().filter(|(fp, _)| *fp == fingerprint).count();
        repeats >= REPEAT_THRESHOLD && !self.window.iter().any(|(_, changed)| *changed)
    }

    /// Returns `true` once three consecutive `read_tree` calls have hit the
    /// same path, resetting the counter either way.
    pub fn check_scope_loop(&mut self, action: &Action) -> bool {
        let Action::ReadTree { path, .. } = action else {
            self.scope_loop_path = None;
            self.scope_loop_count = 0;
            return false;
        };
        let path = path.clone().unwrap_or_else(|| ".".to_string());
        if self.scope_loop_path.as_deref() == Some(path.as_str()) {
            self.scope_loop_count += 1;
        } else {
            self.scope_loop_path = Some(path);
            self.scope_loop_count = 1;
        }
        if self.scope_loop_count >= SCOPE_LOOP_THRESHOLD {
            self.scope_loop_count = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_tree(path: &str) -> Action {
        Action::ReadTree { path: Some(path.to_string()), max_depth: None, limit: None }
    }

    #[test]
    fn repeated_fingerprint_without_progress_is_stagnant() {
        let mut tracker = StagnationTracker::new();
        assert!(!tracker.record(&read_tree("src")));
        assert!(!tracker.record(&read_tree("src")));
        assert!(tracker.record(&read_tree("src")));
    }

    #[test]
    fn state_changing_action_resets_stagnation() {
        let mut tracker = StagnationTracker::new();
        tracker.record(&read_tree("src"));
        tracker.record(&read_tree("src"));
        let write = Action::WriteFile { path: "a.rs".to_string(), content: "x".to_string() };
        assert!(!tracker.record(&write));
        assert!(!tracker.record(&read_tree("src")));
    }

    #[test]
    fn three_consecutive_same_path_trees_trigger_scope_loop() {
        let mut tracker = StagnationTracker::new();
        assert!(!tracker.check_scope_loop(&read_tree("src")));
        assert!(!tracker.check_scope_loop(&read_tree("src")));
        assert!(tracker.check_scope_loop(&read_tree("src")));
    }

    #[test]
    fn different_path_resets_scope_loop_counter() {
        let mut tracker = StagnationTracker::new();
        tracker.check_scope_loop(&read_tree("src"));
        tracker.check_scope_loop(&read_tree("src"));
        assert!(!tracker.check_scope_loop(&read_tree("docs")));
    }
}
