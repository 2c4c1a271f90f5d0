//! Build-Environment Manager's deterministic half: OS detection, manifest
//! collection, heuristic setup commands, and the LLM setup-response parser.

pub mod heuristics;

pub use heuristics::{
    collect_manifests, detect_os_family, heuristic_setup_commands, parse_setup_commands, ManifestSnapshot,
    OsFamily, MANIFEST_FILENAMES, MANIFEST_TRUNCATE_BYTES,
};
