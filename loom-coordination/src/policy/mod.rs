//! Loop-safety policies: quality gate, secret scanning, redispatch
//! cooldowns, and CEO escalation.

pub mod escalation;
pub mod quality_gate;
pub mod redispatch;
pub mod secrets;

pub use escalation::{draft_escalation_bead, EscalationBeadDraft};
pub use quality_gate::{evaluate, GateInvocation, GateOutcome, GateResult, MissingToolchainPolicy, QualityGateReport};
pub use redispatch::{decide, RedispatchDecision, RedispatchReason, RedispatchState, MAX_REDISPATCH_ATTEMPTS};
pub use secrets::{has_sensitive_filename, scan_diff, SecretHit};
