//! Sandbox Agent Client: RPC interface to a per-project execution sandbox.
//!
//! Transport is request/response JSON over HTTP, grounded on the teacher's
//! `config::check_endpoint_with_model` pattern (reqwest client, bearer
//! auth, bounded timeout). One client instance is held per project in the
//! `SandboxPool` connection pool below.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Serialize)]
pub struct ExecRequest<'a> {
    pub command: &'a str,
    pub working_dir: Option<&'a str>,
    pub timeout_s: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileTreeEntry {
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub line: u32,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitStatusResponse {
    pub branch: String,
    pub clean: bool,
    pub output: String,
}

/// A connection-pooled client bound to one project's sandbox process.
///
/// Network timeout is `exec_timeout + 30s` per call, per spec §4.B.
pub struct SandboxClient {
    base_url: String,
    http: reqwest::Client,
}

impl SandboxClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn health(&self) -> bool {
        let Ok(resp) = self
            .http
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        else {
            return false;
        };
        resp.status().is_success()
    }

    pub async fn status(&self) -> OrchestratorResult<serde_json::Value> {
        self.get_json("/status", Duration::from_secs(10)).await
    }

    pub async fn exec(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout_s: u64,
    ) -> OrchestratorResult<ExecResponse> {
        let net_timeout = Duration::from_secs(timeout_s + 30);
        let req = ExecRequest { command, working_dir, timeout_s };
        self.post_json("/exec", &req, net_timeout).await
    }

    pub async fn files_read(&self, path: &str) -> OrchestratorResult<String> {
        #[derive(Serialize)]
        struct Req<'a> { path: &'a str }
        #[derive(Deserialize)]
        struct Resp { content: String }
        let resp: Resp = self
            .post_json("/files/read", &Req { path }, Duration::from_secs(30))
            .await?;
        Ok(resp.content)
    }

    pub async fn files_write(&self, path: &str, content: &str) -> OrchestratorResult<()> {
        #[derive(Serialize)]
        struct Req<'a> { path: &'a str, content: &'a str }
        let _: serde_json::Value = self
            .post_json("/files/write", &Req { path, content }, Duration::from_secs(30))
            .await?;
        Ok(())
    }

    pub async fn files_tree(&self, path: &str, max_depth: u32) -> OrchestratorResult<Vec<FileTreeEntry>> {
        #[derive(Serialize)]
        struct Req<'a> { path: &'a str, max_depth: u32 }
        #[derive(Deserialize)]
        struct Resp { entries: Vec<FileTreeEntry> }
        let resp: Resp = self
            .post_json("/files/tree", &Req { path, max_depth }, Duration::from_secs(30))
            .await?;
        Ok(resp.entries)
    }

    pub async fn files_search(&self, query: &str, path: Option<&str>) -> OrchestratorResult<Vec<SearchHit>> {
        #[derive(Serialize)]
        struct Req<'a> { query: &'a str, path: Option<&'a str> }
        #[derive(Deserialize)]
        struct Resp { hits: Vec<SearchHit> }
        let resp: Resp = self
            .post_json("/files/search", &Req { query, path }, Duration::from_secs(30))
            .await?;
        Ok(resp.hits)
    }

    pub async fn git_status(&self) -> OrchestratorResult<GitStatusResponse> {
        self.post_json("/git/status", &(), Duration::from_secs(30)).await
    }

    pub async fn git_diff(&self) -> OrchestratorResult<String> {
        #[derive(Deserialize)]
        struct Resp { diff: String }
        let resp: Resp = self.post_json("/git/diff", &(), Duration::from_secs(30)).await?;
        Ok(resp.diff)
    }

    pub async fn git_commit(&self, message: &str) -> OrchestratorResult<String> {
        #[derive(Serialize)]
        struct Req<'a> { message: &'a str }
        #[derive(Deserialize)]
        struct Resp { sha: String }
        let resp: Resp = self
            .post_json("/git/commit", &Req { message }, Duration::from_secs(30))
            .await?;
        Ok(resp.sha)
    }

    pub async fn git_push(&self, branch: &str) -> OrchestratorResult<()> {
        #[derive(Serialize)]
        struct Req<'a> { branch: &'a str }
        let _: serde_json::Value = self
            .post_json("/git/push", &Req { branch }, Duration::from_secs(60))
            .await?;
        Ok(())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, timeout: Duration) -> OrchestratorResult<T> {
        let resp = self
            .http
            .get(self.url(path))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| OrchestratorError::SandboxTransient(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> OrchestratorResult<T> {
        let resp = self
            .http
            .post(self.url(path))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| OrchestratorError::SandboxTransient(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> OrchestratorResult<T> {
        let status = resp.status();
        if status.is_server_error() {
            return Err(OrchestratorError::SandboxTransient(format!("{status}")));
        }
        if !status.is_success() {
            return Err(OrchestratorError::SandboxPermanent(format!("{status}")));
        }
        resp.json::<T>()
            .await
            .map_err(|e| OrchestratorError::SandboxPermanent(format!("malformed sandbox response: {e}")))
    }
}

/// Per-project connection pool, grounded on the teacher's
/// `ClientSet`/endpoint-keyed config pattern.
#[derive(Default)]
pub struct SandboxPool {
    clients: Mutex<HashMap<String, Arc<SandboxClient>>>,
}

impl SandboxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_insert(&self, project_id: &str, base_url: &str) -> Arc<SandboxClient> {
        let mut clients = self.clients.lock().await;
        clients
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(SandboxClient::new(base_url)))
            .clone()
    }

    pub async fn get(&self, project_id: &str) -> Option<Arc<SandboxClient>> {
        self.clients.lock().await.get(project_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_false_when_unreachable() {
        let client = SandboxClient::new("http://127.0.0.1:1");
        assert!(!client.health().await);
    }

    #[tokio::test]
    async fn pool_reuses_client_per_project() {
        let pool = SandboxPool::new();
        let a = pool.get_or_insert("proj-1", "http://localhost:9000").await;
        let b = pool.get_or_insert("proj-1", "http://localhost:9999").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn pool_get_none_for_unknown_project() {
        let pool = SandboxPool::new();
        assert!(pool.get("unknown").await.is_none());
    }
}
