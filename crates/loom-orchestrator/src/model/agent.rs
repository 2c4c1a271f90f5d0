//! Agent: persona + role + project binding. Consumes beads.

use serde::{Deserialize, Serialize};

/// Roles the spec leaves unenumerated; grounded on the teacher's
/// AgentFactory persona set. Used for role-matching in dispatch and
/// for CEO escalation routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Coder,
    Reviewer,
    Adversary,
    Manager,
    Ceo,
    Specialist(String),
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coder => write!(f, "coder"),
            Self::Reviewer => write!(f, "reviewer"),
            Self::Adversary => write!(f, "adversary"),
            Self::Manager => write!(f, "manager"),
            Self::Ceo => write!(f, "ceo"),
            Self::Specialist(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub persona: String,
    pub role: AgentRole,
    pub project_id: String,
    pub status: AgentStatus,
    /// At most one bead at a time; empty when idle.
    pub current_bead_id: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>, role: AgentRole, project_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            persona: String::new(),
            role,
            project_id: project_id.into(),
            status: AgentStatus::Idle,
            current_bead_id: None,
        }
    }

    pub fn matches_role(&self, wanted: &AgentRole) -> bool {
        &self.role == wanted
    }

    pub fn claim(&mut self, bead_id: &str) {
        self.status = AgentStatus::Working;
        self.current_bead_id = Some(bead_id.to_string());
    }

    pub fn release(&mut self) {
        self.status = AgentStatus::Idle;
        self.current_bead_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_sets_working_status() {
        let mut agent = Agent::new("a1", AgentRole::Coder, "proj");
        agent.claim("bead-1");
        assert_eq!(agent.status, AgentStatus::Working);
        assert_eq!(agent.current_bead_id.as_deref(), Some("bead-1"));
    }

    #[test]
    fn release_clears_current_bead() {
        let mut agent = Agent::new("a1", AgentRole::Coder, "proj");
        agent.claim("bead-1");
        agent.release();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.current_bead_id.is_none());
    }

    #[test]
    fn role_display_matches_wire_name() {
        assert_eq!(AgentRole::Ceo.to_string(), "ceo");
        assert_eq!(AgentRole::Specialist("rust-expert".into()).to_string(), "rust-expert");
    }
}
