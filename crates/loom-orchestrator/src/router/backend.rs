//! Capability interfaces for the sandbox-vs-local dichotomy (spec §9:
//! "a capability interface FileOps/GitOps with two implementations; the
//! router's dispatch never branches on concrete type, only on 'is there
//! a ready sandbox?'").

use async_trait::async_trait;
use loom_coordination::files::LocalFileManager;
use loom_coordination::git::GitService;
use loom_coordination::ActionContext;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::sandbox::client::SandboxClient;

#[async_trait]
pub trait FileOps: Send + Sync {
    async fn read_file(&self, path: &str) -> OrchestratorResult<String>;
    async fn write_file(&self, path: &str, content: &str) -> OrchestratorResult<()>;
    async fn read_tree(&self, path: &str, max_depth: u32) -> OrchestratorResult<Vec<String>>;
    async fn search_text(&self, query: &str, path: Option<&str>) -> OrchestratorResult<Vec<String>>;
    async fn run_command(&self, command: &str, working_dir: Option<&str>, timeout_s: u64) -> OrchestratorResult<(String, String, i32)>;
    /// Returns `(matched, strategy)` per the `MatchAndReplace` outcome.
    async fn edit_code(&self, path: &str, old_text: &str, new_text: &str) -> OrchestratorResult<(bool, String)>;
    async fn apply_patch(&self, patch: &str) -> OrchestratorResult<Vec<String>>;
}

pub struct LocalFileOps {
    pub manager: LocalFileManager,
    pub root: std::path::PathBuf,
}

impl LocalFileOps {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        let root = root.into();
        Self { manager: LocalFileManager::new(root.clone()), root }
    }
}

#[async_trait]
impl FileOps for LocalFileOps {
    async fn read_file(&self, path: &str) -> OrchestratorResult<String> {
        self.manager.read_file(path).map_err(OrchestratorError::from)
    }

    async fn write_file(&self, path: &str, content: &str) -> OrchestratorResult<()> {
        self.manager.write_file(path, content).map_err(OrchestratorError::from)
    }

    async fn read_tree(&self, path: &str, max_depth: u32) -> OrchestratorResult<Vec<String>> {
        self.manager
            .read_tree(path, max_depth)
            .map(|entries| entries.into_iter().map(|e| e.path).collect())
            .map_err(OrchestratorError::from)
    }

    async fn search_text(&self, query: &str, path: Option<&str>) -> OrchestratorResult<Vec<String>> {
        self.manager
            .search_text(path.unwrap_or("."), query)
            .map(|hits| hits.into_iter().map(|h| format!("{}:{}: {}", h.path, h.line, h.text)).collect())
            .map_err(OrchestratorError::from)
    }

    async fn run_command(&self, command: &str, working_dir: Option<&str>, timeout_s: u64) -> OrchestratorResult<(String, String, i32)> {
        let dir = working_dir.map(std::path::PathBuf::from).unwrap_or_else(|| self.root.clone());
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(timeout_s),
            tokio::process::Command::new("sh").arg("-c").arg(command).current_dir(dir).output(),
        )
        .await
        .map_err(|_| OrchestratorError::SandboxTransient("command timed out".into()))?
        .map_err(|e| OrchestratorError::SandboxPermanent(e.to_string()))?;
        Ok((
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            output.status.code().unwrap_or(-1),
        ))
    }

    async fn edit_code(&self, path: &str, old_text: &str, new_text: &str) -> OrchestratorResult<(bool, String)> {
        let outcome = self.manager.edit_code(path, old_text, new_text).map_err(OrchestratorError::from)?;
        Ok((outcome.matched, outcome.strategy))
    }

    async fn apply_patch(&self, patch: &str) -> OrchestratorResult<Vec<String>> {
        self.manager.apply_patch(patch).map_err(OrchestratorError::from)
    }
}

pub struct SandboxFileOps {
    pub client: std::sync::Arc<SandboxClient>,
}

#[async_trait]
impl FileOps for SandboxFileOps {
    async fn read_file(&self, path: &str) -> OrchestratorResult<String> {
        self.client.files_read(path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> OrchestratorResult<()> {
        self.client.files_write(path, content).await
    }

    async fn read_tree(&self, path: &str, max_depth: u32) -> OrchestratorResult<Vec<String>> {
        Ok(self.client.files_tree(path, max_depth).await?.into_iter().map(|e| e.path).collect())
    }

    async fn search_text(&self, query: &str, path: Option<&str>) -> OrchestratorResult<Vec<String>> {
        Ok(self
            .client
            .files_search(query, path)
            .await?
            .into_iter()
            .map(|h| format!("{}:{}: {}", h.path, h.line, h.text))
            .collect())
    }

    async fn run_command(&self, command: &str, working_dir: Option<&str>, timeout_s: u64) -> OrchestratorResult<(String, String, i32)> {
        let resp = self.client.exec(command, working_dir, timeout_s).await?;
        Ok((resp.stdout, resp.stderr, resp.exit_code))
    }

    /// The sandbox RPC surface has no dedicated edit endpoint; read the
    /// file, run the same `MatchAndReplace` strategy chain locally, and
    /// write the result back through `/files/write`.
    async fn edit_code(&self, path: &str, old_text: &str, new_text: &str) -> OrchestratorResult<(bool, String)> {
        let content = self.client.files_read(path).await?;
        let outcome = loom_coordination::files::match_and_replace(&content, old_text, new_text);
        if outcome.matched {
            self.client.files_write(path, &outcome.result).await?;
        }
        Ok((outcome.matched, outcome.strategy.to_string()))
    }

    /// Multi-file unified-diff application has no sandbox RPC analog.
    async fn apply_patch(&self, _patch: &str) -> OrchestratorResult<Vec<String>> {
        Err(OrchestratorError::NoBackend("apply_patch is not supported against a sandbox backend".into()))
    }
}

#[async_trait]
pub trait GitOps: Send + Sync {
    async fn status(&self) -> OrchestratorResult<String>;
    async fn diff(&self) -> OrchestratorResult<String>;
    /// `gate_passed` is the caller's quality-gate verdict (spec §3, §8); this
    /// trait never runs builds itself, it only carries the outcome through.
    async fn commit(&self, ctx: &ActionContext, message: &str, gate_passed: bool) -> OrchestratorResult<String>;
    async fn push(&self, branch: &str) -> OrchestratorResult<()>;
}

pub struct LocalGitOps {
    pub service: GitService,
}

#[async_trait]
impl GitOps for LocalGitOps {
    async fn status(&self) -> OrchestratorResult<String> {
        self.service.status().map_err(OrchestratorError::from)
    }

    async fn diff(&self) -> OrchestratorResult<String> {
        self.service.diff().map_err(OrchestratorError::from)
    }

    async fn commit(&self, ctx: &ActionContext, message: &str, gate_passed: bool) -> OrchestratorResult<String> {
        use loom_coordination::git::CommitRequest;
        let req = CommitRequest {
            bead_id: &ctx.bead_id,
            agent_id: &ctx.agent_id,
            message: Some(message),
            files: &[],
            allow_all: true,
        };
        self.service.commit(req, gate_passed).map_err(OrchestratorError::from)
    }

    async fn push(&self, branch: &str) -> OrchestratorResult<()> {
        self.service.push(Some(branch), true, false).map_err(OrchestratorError::from)
    }
}

pub struct SandboxGitOps {
    pub client: std::sync::Arc<SandboxClient>,
}

#[async_trait]
impl GitOps for SandboxGitOps {
    async fn status(&self) -> OrchestratorResult<String> {
        Ok(self.client.git_status().await?.output)
    }

    async fn diff(&self) -> OrchestratorResult<String> {
        self.client.git_diff().await
    }

    /// The sandbox RPC surface has no parameters for bead/agent trailers or
    /// a gate verdict; `ctx`/`gate_passed` are accepted to satisfy the
    /// shared trait but the sandbox side commits unconditionally.
    async fn commit(&self, _ctx: &ActionContext, message: &str, _gate_passed: bool) -> OrchestratorResult<String> {
        self.client.git_commit(message).await
    }

    async fn push(&self, branch: &str) -> OrchestratorResult<()> {
        self.client.git_push(branch).await
    }
}
