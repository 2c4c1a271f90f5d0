//! Structured JSON audit log, one record per git operation (spec §4.E).

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitAuditRecord {
    pub op: String,
    pub bead_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
struct GitAuditEntry<'a> {
    ts: DateTime<Utc>,
    project_id: &'a str,
    op: &'a str,
    bead_id: &'a str,
    #[serde(rename = "ref")]
    git_ref: &'a str,
    success: bool,
    error: &'a Option<String>,
    duration_ms: u64,
}

/// Appends newline-delimited JSON to a per-project audit log file. Guarded
/// by a mutex since multiple dispatches for the same project may append
/// concurrently (spec §5: "Global: audit-log append mutex").
pub struct AuditLogger {
    path: PathBuf,
    project_id: String,
    lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        Self { path: path.into(), project_id: project_id.into(), lock: Mutex::new(()) }
    }

    pub fn append(&self, record: GitAuditRecord) {
        let entry = GitAuditEntry {
            ts: Utc::now(),
            project_id: &self.project_id,
            op: &record.op,
            bead_id: &record.bead_id,
            git_ref: &record.git_ref,
            success: record.success,
            error: &record.error,
            duration_ms: record.duration_ms,
        };
        let Ok(line) = serde_json::to_string(&entry) else {
            tracing::warn!("failed to serialize git audit record");
            return;
        };

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let file = OpenOptions::new().create(true).append(true).open(&self.path);
        match file {
            Ok(mut f) => {
                if let Err(err) = writeln!(f, "{line}") {
                    tracing::warn!(%err, "failed to append git audit record");
                }
            }
            Err(err) => tracing::warn!(%err, path = %self.path.display(), "failed to open git audit log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_writes_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let logger = AuditLogger::new(&path, "proj-1");

        logger.append(GitAuditRecord {
            op: "commit".to_string(),
            bead_id: "bd-1".to_string(),
            git_ref: "bead/bd-1/fix".to_string(),
            success: true,
            error: None,
            duration_ms: 12,
        });
        logger.append(GitAuditRecord {
            op: "push".to_string(),
            bead_id: "bd-1".to_string(),
            git_ref: "bead/bd-1/fix".to_string(),
            success: false,
            error: Some("network unreachable".to_string()),
            duration_ms: 8,
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["project_id"], "proj-1");
        assert_eq!(first["op"], "commit");
        assert_eq!(first["success"], true);
    }
}
