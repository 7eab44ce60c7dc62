//! Memory persistence interface and the in-memory store
//!
//! `MemoryStore` is the only writer of persisted records. `InMemoryStore`
//! keeps everything behind a single `tokio::sync::RwLock` so each write is
//! atomic with respect to readers.

use super::types::*;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence contract used by the retrieval engine and session coordinator.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// All curated memories of a project, oldest first
    async fn get_all_curated_memories(&self, project_id: &str) -> Result<Vec<MemoryRecord>>;

    /// Persist a memory, returning its id
    async fn store_memory(&self, record: MemoryRecord) -> Result<Uuid>;

    async fn store_session_summary(&self, summary: SessionSummary) -> Result<()>;

    async fn store_project_snapshot(&self, snapshot: ProjectSnapshot) -> Result<()>;

    /// Most recent summary for the project
    async fn get_last_session_summary(&self, project_id: &str) -> Result<Option<SessionSummary>>;

    /// Most recent snapshot for the project
    async fn get_last_project_snapshot(&self, project_id: &str)
        -> Result<Option<ProjectSnapshot>>;

    /// Fetch the project record, creating it on first reference
    async fn ensure_project_exists(&self, project_id: &str) -> Result<ProjectRecord>;

    /// True until a checkpoint for the project has produced a memory
    async fn is_first_session_for_project(&self, project_id: &str) -> Result<bool>;

    async fn mark_first_session_completed(&self, project_id: &str) -> Result<()>;

    /// Bump project counters and touch `last_active`
    async fn update_project_stats(
        &self,
        project_id: &str,
        sessions_delta: u64,
        memories_delta: u64,
    ) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Snapshot of everything a store holds. Shared by the in-memory and file stores.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub memories: HashMap<String, Vec<MemoryRecord>>,
    pub summaries: HashMap<String, Vec<SessionSummary>>,
    pub snapshots: HashMap<String, Vec<ProjectSnapshot>>,
    pub projects: HashMap<String, ProjectRecord>,
}

impl StoreState {
    pub fn curated(&self, project_id: &str) -> Vec<MemoryRecord> {
        self.memories
            .get(project_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.metadata.curated)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn insert_memory(&mut self, record: MemoryRecord) {
        let records = self.memories.entry(record.project_id.clone()).or_default();
        records.push(record);
        records.sort_by_key(|r| r.timestamp);
    }

    pub fn last_summary(&self, project_id: &str) -> Option<SessionSummary> {
        self.summaries
            .get(project_id)?
            .iter()
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    pub fn last_snapshot(&self, project_id: &str) -> Option<ProjectSnapshot> {
        self.snapshots
            .get(project_id)?
            .iter()
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    /// Returns the project and whether it was just created
    pub fn ensure_project(&mut self, project_id: &str) -> (ProjectRecord, bool) {
        if let Some(project) = self.projects.get(project_id) {
            return (project.clone(), false);
        }
        let project = ProjectRecord::new(project_id);
        self.projects.insert(project_id.to_string(), project.clone());
        (project, true)
    }

    /// Apply `f` to the project (creating it first) and return the updated copy
    pub fn update_project<F>(&mut self, project_id: &str, f: F) -> ProjectRecord
    where
        F: FnOnce(&mut ProjectRecord),
    {
        let project = self
            .projects
            .entry(project_id.to_string())
            .or_insert_with(|| ProjectRecord::new(project_id));
        f(project);
        project.clone()
    }

    pub fn stats(&self) -> StoreStats {
        let mut projects: Vec<ProjectStats> = self
            .projects
            .values()
            .map(|p| ProjectStats {
                id: p.id.clone(),
                total_sessions: p.total_sessions,
                total_memories: p.total_memories,
                first_session_completed: p.first_session_completed,
                last_active: p.last_active,
            })
            .collect();
        projects.sort_by(|a, b| b.last_active.cmp(&a.last_active).then(a.id.cmp(&b.id)));

        StoreStats {
            total_projects: self.projects.len(),
            total_sessions: self.projects.values().map(|p| p.total_sessions).sum(),
            total_curated_memories: self
                .memories
                .values()
                .flatten()
                .filter(|r| r.metadata.curated)
                .count(),
            projects,
        }
    }
}

/// Process-local memory store
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get_all_curated_memories(&self, project_id: &str) -> Result<Vec<MemoryRecord>> {
        Ok(self.state.read().await.curated(project_id))
    }

    async fn store_memory(&self, record: MemoryRecord) -> Result<Uuid> {
        let id = record.id;
        self.state.write().await.insert_memory(record);
        Ok(id)
    }

    async fn store_session_summary(&self, summary: SessionSummary) -> Result<()> {
        self.state
            .write()
            .await
            .summaries
            .entry(summary.project_id.clone())
            .or_default()
            .push(summary);
        Ok(())
    }

    async fn store_project_snapshot(&self, snapshot: ProjectSnapshot) -> Result<()> {
        self.state
            .write()
            .await
            .snapshots
            .entry(snapshot.project_id.clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn get_last_session_summary(&self, project_id: &str) -> Result<Option<SessionSummary>> {
        Ok(self.state.read().await.last_summary(project_id))
    }

    async fn get_last_project_snapshot(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectSnapshot>> {
        Ok(self.state.read().await.last_snapshot(project_id))
    }

    async fn ensure_project_exists(&self, project_id: &str) -> Result<ProjectRecord> {
        Ok(self.state.write().await.ensure_project(project_id).0)
    }

    async fn is_first_session_for_project(&self, project_id: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .projects
            .get(project_id)
            .map(|p| !p.first_session_completed)
            .unwrap_or(true))
    }

    async fn mark_first_session_completed(&self, project_id: &str) -> Result<()> {
        self.state
            .write()
            .await
            .update_project(project_id, |p| p.first_session_completed = true);
        Ok(())
    }

    async fn update_project_stats(
        &self,
        project_id: &str,
        sessions_delta: u64,
        memories_delta: u64,
    ) -> Result<()> {
        self.state.write().await.update_project(project_id, |p| {
            p.total_sessions += sessions_delta;
            p.total_memories += memories_delta;
            p.last_active = Utc::now();
        });
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(self.state.read().await.stats())
    }
}
