//! Build-Environment Manager, orchestration half. See
//! `loom_coordination::buildenv` for the deterministic heuristic half.

pub mod manager;

pub use manager::{BuildEnvManager, OnReadyCallback, SetupCommandProvider, MARKER_FILE};
