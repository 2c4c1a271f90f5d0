//! Error taxonomy for the coordination layer.
//!
//! Every error is tagged with the recovery kind from the error-handling
//! design: Validation, Parse failure, Policy, or Fatal. Transient/permanent
//! infra errors belong to `loom-orchestrator` since they originate from
//! network/IPC calls this crate never makes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors produced by action validation, file/git backends, and policy checks.
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// The LLM produced an action missing required fields or of unknown type.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Response could not be decoded even leniently.
    #[error("parse failure: {message}")]
    Parse { message: String },

    /// Protected branch, forbidden file, secret detected, force push, etc.
    #[error("policy violation: {message}")]
    Policy { message: String },

    /// A path resolved outside the project workdir or hit the block-list.
    #[error("path `{path}` escapes project workdir")]
    PathEscape { path: String },

    /// Invariant violated on reload (e.g. bead assigned_to/status disagree).
    #[error("invariant violated: {message}")]
    Invariant { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoordinationError {
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Whether this error kind should terminate a dispatch outright rather
    /// than being reported back to the LLM as feedback.
    pub fn is_escalation_trigger(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Invariant { .. })
    }
}

/// Agent-friendly structured error, mirroring the action-result metadata
/// contract: a machine-readable code, a message, a recovery hint, and
/// free-form context for the feedback formatter to key hints on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: String,
    pub message: String,
    pub recovery_action: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}
