//! Project: a git repository the dispatcher drives work against.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitStrategy {
    BranchPerBead,
    TrunkBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub work_dir: PathBuf,
    pub git_strategy: GitStrategy,
    pub use_container: bool,
    pub repo_url: String,
}

impl Project {
    pub fn local(id: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            work_dir: work_dir.into(),
            git_strategy: GitStrategy::BranchPerBead,
            use_container: false,
            repo_url: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_project_defaults_to_no_container() {
        let project = Project::local("proj-1", "/tmp/proj-1");
        assert!(!project.use_container);
        assert_eq!(project.git_strategy, GitStrategy::BranchPerBead);
    }
}
