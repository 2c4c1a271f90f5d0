//! Orchestrator error taxonomy: the network/IPC/infra errors that
//! `loom-coordination` never produces, since it makes no network calls
//! of its own. Mirrors `loom_coordination::CoordinationError`'s shape
//! (kind enum + `is_retryable`) per spec §7's error-kind classification.

use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Sandbox RPC unreachable or returned 5xx; bounded retry, redispatch eligible.
    #[error("sandbox transient error: {0}")]
    SandboxTransient(String),

    /// Sandbox gone, repo missing, disk full — surfaces as dispatch failure.
    #[error("sandbox permanent error: {0}")]
    SandboxPermanent(String),

    /// LLM provider HTTP 5xx or rate-limit.
    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    /// LLM provider auth failure.
    #[error("provider auth error: {0}")]
    ProviderAuth(String),

    /// No ready sandbox and the action has no local analog.
    #[error("no backend available for action: {0}")]
    NoBackend(String),

    /// Invariant violated on reload (e.g. bead assigned_to/status disagree). No automatic repair.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Coordination(#[from] loom_coordination::CoordinationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SandboxTransient(_) | Self::ProviderTransient(_))
    }

    pub fn is_escalation_trigger(&self) -> bool {
        matches!(
            self,
            Self::SandboxPermanent(_) | Self::ProviderAuth(_) | Self::Invariant(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(OrchestratorError::SandboxTransient("timeout".into()).is_retryable());
        assert!(!OrchestratorError::Invariant("bad state".into()).is_retryable());
    }

    #[test]
    fn permanent_errors_trigger_escalation() {
        assert!(OrchestratorError::SandboxPermanent("gone".into()).is_escalation_trigger());
        assert!(!OrchestratorError::SandboxTransient("timeout".into()).is_escalation_trigger());
    }
}
