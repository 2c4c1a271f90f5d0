//! Terminal-unresolved-bead escalation to the CEO role (spec §4.J).

/// Fields for the decision bead auto-filed when a bead exhausts its
/// redispatch budget. The orchestrator's `model::bead` turns this into an
/// actual `Bead`; this crate only decides the shape.
pub struct EscalationBeadDraft {
    pub title: String,
    pub description: String,
    pub priority: i32,
    pub bead_type: &'static str,
    pub routed_to_role: &'static str,
}

pub fn draft_escalation_bead(original_bead_id: &str, reason: &str) -> EscalationBeadDraft {
    EscalationBeadDraft {
        title: format!("Escalation: bead {original_bead_id} exhausted redispatch budget"),
        description: format!(
            "Bead {original_bead_id} could not make progress after the maximum redispatch \
             attempts. Last blocking reason: {reason}. Needs a decision on how to proceed."
        ),
        priority: 0,
        bead_type: "decision",
        routed_to_role: "ceo",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_bead_is_priority_zero_decision_type() {
        let draft = draft_escalation_bead("bd-1", "progress_stagnant");
        assert_eq!(draft.priority, 0);
        assert_eq!(draft.bead_type, "decision");
        assert_eq!(draft.routed_to_role, "ceo");
        assert!(draft.description.contains("bd-1"));
    }
}
