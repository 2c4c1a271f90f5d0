//! Action Router (§4.F): capability-interface backends plus the dispatch
//! match that turns an `Action` into an `ActionResult`.

pub mod backend;
pub mod route;

pub use backend::{FileOps, GitOps, LocalFileOps, LocalGitOps, SandboxFileOps, SandboxGitOps};
pub use route::{auto_file_parse_failure, Router};
