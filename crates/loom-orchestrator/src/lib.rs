//! `loom-orchestrator`: the stateful half of loom. Owns the data model,
//! the sandbox RPC client and container adapter, the build-environment
//! orchestration state, the action router's backends, and the dispatch
//! loop that drives an LLM provider against a bead until it's done. The
//! deterministic half — action codec, local file/git backends, feedback
//! formatting, loop-safety policy — lives in `loom-coordination`.

pub mod buildenv;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod router;
pub mod sandbox;

pub use error::{OrchestratorError, OrchestratorResult};
