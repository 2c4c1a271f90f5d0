//! Bead: the unit of work the dispatcher drains from the ready queue.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Done,
    Closed,
}

impl BeadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadType {
    Task,
    Bug,
    Decision,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bead {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: BeadStatus,
    /// 0 is highest priority, 4 is lowest.
    pub priority: u8,
    pub bead_type: BeadType,
    pub project_id: String,
    /// Empty when unassigned. Invariant: non-empty iff status is InProgress.
    pub assigned_to: String,
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dispatch_count: u32,
    pub last_run_error: Option<String>,
    pub parent_bead_id: Option<String>,
}

impl Bead {
    pub fn new(id: impl Into<String>, title: impl Into<String>, project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: BeadStatus::Open,
            priority: 2,
            bead_type: BeadType::Task,
            project_id: project_id.into(),
            assigned_to: String::new(),
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
            dispatch_count: 0,
            last_run_error: None,
            parent_bead_id: None,
        }
    }

    /// Invariant from the data model: assigned_to != "" iff status is in_progress.
    pub fn invariant_holds(&self) -> bool {
        (self.assigned_to.is_empty() && self.status != BeadStatus::InProgress)
            || (!self.assigned_to.is_empty() && self.status == BeadStatus::InProgress)
    }

    pub fn is_ready(&self, ready_ids: &HashMap<String, BeadStatus>) -> bool {
        self.status == BeadStatus::Open
            && self.dependencies.iter().all(|dep| {
                ready_ids
                    .get(dep)
                    .map(|s| s.is_terminal())
                    .unwrap_or(false)
            })
    }

    pub fn dispatch(&mut self, agent_id: &str) {
        self.status = BeadStatus::InProgress;
        self.assigned_to = agent_id.to_string();
        self.dispatch_count += 1;
        self.updated_at = Utc::now();
    }

    /// Closing clears assigned_to atomically, per the data model invariant.
    pub fn close(&mut self, done: bool) {
        self.status = if done { BeadStatus::Done } else { BeadStatus::Closed };
        self.assigned_to.clear();
        self.updated_at = Utc::now();
    }

    pub fn reset_for_redispatch(&mut self) {
        self.status = BeadStatus::Open;
        self.assigned_to.clear();
        self.updated_at = Utc::now();
    }
}

/// Filter applied when selecting the next ready bead for dispatch.
#[derive(Debug, Clone, Default)]
pub struct ReadyFilter {
    pub project_id: Option<String>,
    pub role_hint: Option<String>,
}

/// Persistence seam. Real persistence is out of scope; an external store
/// implements this trait. `InMemoryBeadStore` below is the reference
/// implementation used by tests and the `loom` binary's demo mode.
pub trait BeadStore: Send + Sync {
    fn next_ready(&self, filter: &ReadyFilter) -> Option<Bead>;
    fn save(&self, bead: &Bead) -> anyhow::Result<()>;
    fn get(&self, id: &str) -> Option<Bead>;
    fn list(&self, project_id: &str) -> Vec<Bead>;
}

#[derive(Default)]
pub struct InMemoryBeadStore {
    beads: Mutex<HashMap<String, Bead>>,
}

impl InMemoryBeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BeadStore for InMemoryBeadStore {
    fn next_ready(&self, filter: &ReadyFilter) -> Option<Bead> {
        let statuses: HashMap<String, BeadStatus> = self
            .beads
            .lock()
            .unwrap()
            .values()
            .map(|b| (b.id.clone(), b.status))
            .collect();

        let beads = self.beads.lock().unwrap();
        let mut candidates: Vec<&Bead> = beads
            .values()
            .filter(|b| {
                filter
                    .project_id
                    .as_deref()
                    .map(|p| p == b.project_id)
                    .unwrap_or(true)
            })
            .filter(|b| b.is_ready(&statuses))
            .collect();

        candidates.sort_by_key(|b| (b.priority, b.created_at));
        candidates.first().map(|b| (*b).clone())
    }

    fn save(&self, bead: &Bead) -> anyhow::Result<()> {
        self.beads.lock().unwrap().insert(bead.id.clone(), bead.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Bead> {
        self.beads.lock().unwrap().get(id).cloned()
    }

    fn list(&self, project_id: &str) -> Vec<Bead> {
        self.beads
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bead_satisfies_invariant() {
        let bead = Bead::new("b1", "title", "proj");
        assert!(bead.invariant_holds());
        assert_eq!(bead.status, BeadStatus::Open);
    }

    #[test]
    fn dispatch_sets_in_progress_and_assignee() {
        let mut bead = Bead::new("b1", "title", "proj");
        bead.dispatch("agent-1");
        assert!(bead.invariant_holds());
        assert_eq!(bead.status, BeadStatus::InProgress);
        assert_eq!(bead.assigned_to, "agent-1");
        assert_eq!(bead.dispatch_count, 1);
    }

    #[test]
    fn close_clears_assignee_atomically() {
        let mut bead = Bead::new("b1", "title", "proj");
        bead.dispatch("agent-1");
        bead.close(true);
        assert!(bead.invariant_holds());
        assert_eq!(bead.status, BeadStatus::Done);
        assert!(bead.assigned_to.is_empty());
    }

    #[test]
    fn ready_requires_dependencies_terminal() {
        let mut dep = Bead::new("dep", "dep title", "proj");
        dep.status = BeadStatus::Done;
        let mut bead = Bead::new("b1", "title", "proj");
        bead.dependencies.push("dep".to_string());

        let mut statuses = HashMap::new();
        statuses.insert(dep.id.clone(), dep.status);
        assert!(bead.is_ready(&statuses));

        statuses.insert(dep.id.clone(), BeadStatus::Open);
        assert!(!bead.is_ready(&statuses));
    }

    #[test]
    fn in_memory_store_picks_lowest_priority_number_first() {
        let store = InMemoryBeadStore::new();
        let mut low = Bead::new("b-low", "low prio", "proj");
        low.priority = 3;
        let mut high = Bead::new("b-high", "high prio", "proj");
        high.priority = 0;
        store.save(&low).unwrap();
        store.save(&high).unwrap();

        let picked = store.next_ready(&ReadyFilter::default()).unwrap();
        assert_eq!(picked.id, "b-high");
    }

    #[test]
    fn in_memory_store_filters_blocked_and_in_progress() {
        let store = InMemoryBeadStore::new();
        let mut blocked = Bead::new("b1", "t", "proj");
        blocked.status = BeadStatus::Blocked;
        store.save(&blocked).unwrap();
        assert!(store.next_ready(&ReadyFilter::default()).is_none());
    }
}
