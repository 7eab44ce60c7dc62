//! Memory store with file-based JSON persistence
//!
//! Directory layout:
//! ```text
//! ~/.memoria/store/
//! ├── projects/
//! │   └── <sha256-of-project-id>.json
//! ├── memories/
//! │   └── <uuid>.json
//! ├── summaries/
//! │   └── <uuid>.json
//! └── snapshots/
//!     └── <uuid>.json
//! ```
//!
//! Everything is loaded into memory on open. Each write goes to disk first
//! (temp file + rename) and only then becomes visible to readers; disk
//! writes are serialized through a single mutex.

use super::store::{MemoryStore, StoreState};
use super::types::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// JSON-file backed memory store
pub struct FileMemoryStore {
    base_dir: PathBuf,
    state: Arc<RwLock<StoreState>>,
    write_lock: Mutex<()>,
}

impl FileMemoryStore {
    /// Open (or create) a store rooted at `base_dir`
    pub async fn open(base_dir: PathBuf) -> Result<Self> {
        for sub in ["projects", "memories", "summaries", "snapshots"] {
            tokio::fs::create_dir_all(base_dir.join(sub))
                .await
                .map_err(|e| store_error("create", &base_dir.join(sub), e))?;
        }

        let mut state = StoreState::default();
        for project in load_json_files::<ProjectRecord>(&base_dir.join("projects")).await {
            state.projects.insert(project.id.clone(), project);
        }
        for record in load_json_files::<MemoryRecord>(&base_dir.join("memories")).await {
            state.insert_memory(record);
        }
        for summary in load_json_files::<SessionSummary>(&base_dir.join("summaries")).await {
            state
                .summaries
                .entry(summary.project_id.clone())
                .or_default()
                .push(summary);
        }
        for snapshot in load_json_files::<ProjectSnapshot>(&base_dir.join("snapshots")).await {
            state
                .snapshots
                .entry(snapshot.project_id.clone())
                .or_default()
                .push(snapshot);
        }

        tracing::info!(
            dir = %base_dir.display(),
            projects = state.projects.len(),
            memories = state.memories.values().map(Vec::len).sum::<usize>(),
            "Opened file memory store"
        );

        Ok(Self {
            base_dir,
            state: Arc::new(RwLock::new(state)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn project_path(&self, project_id: &str) -> PathBuf {
        self.base_dir
            .join("projects")
            .join(format!("{}.json", project_file_stem(project_id)))
    }

    async fn persist_project(&self, project: &ProjectRecord) -> Result<()> {
        write_json_atomic(&self.project_path(&project.id), project).await
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn get_all_curated_memories(&self, project_id: &str) -> Result<Vec<MemoryRecord>> {
        Ok(self.state.read().await.curated(project_id))
    }

    async fn store_memory(&self, record: MemoryRecord) -> Result<Uuid> {
        let _guard = self.write_lock.lock().await;
        let id = record.id;
        let path = self.base_dir.join("memories").join(format!("{}.json", id));
        write_json_atomic(&path, &record).await?;
        self.state.write().await.insert_memory(record);
        Ok(id)
    }

    async fn store_session_summary(&self, summary: SessionSummary) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self
            .base_dir
            .join("summaries")
            .join(format!("{}.json", Uuid::new_v4()));
        write_json_atomic(&path, &summary).await?;
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
        let _guard = self.write_lock.lock().await;
        let path = self
            .base_dir
            .join("snapshots")
            .join(format!("{}.json", Uuid::new_v4()));
        write_json_atomic(&path, &snapshot).await?;
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
        if let Some(project) = self.state.read().await.projects.get(project_id) {
            return Ok(project.clone());
        }

        let _guard = self.write_lock.lock().await;
        let mut state = self.state.write().await;
        let (project, created) = state.ensure_project(project_id);
        if created {
            if let Err(e) = self.persist_project(&project).await {
                state.projects.remove(project_id);
                return Err(e);
            }
            tracing::debug!(project_id = project_id, "Created project record");
        }
        Ok(project)
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
        let _guard = self.write_lock.lock().await;
        let mut updated = self
            .state
            .read()
            .await
            .projects
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| ProjectRecord::new(project_id));
        updated.first_session_completed = true;
        self.persist_project(&updated).await?;
        self.state
            .write()
            .await
            .projects
            .insert(project_id.to_string(), updated);
        Ok(())
    }

    async fn update_project_stats(
        &self,
        project_id: &str,
        sessions_delta: u64,
        memories_delta: u64,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut updated = self
            .state
            .read()
            .await
            .projects
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| ProjectRecord::new(project_id));
        updated.total_sessions += sessions_delta;
        updated.total_memories += memories_delta;
        updated.last_active = Utc::now();
        self.persist_project(&updated).await?;
        self.state
            .write()
            .await
            .projects
            .insert(project_id.to_string(), updated);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(self.state.read().await.stats())
    }
}

/// File stem for a project id: hex SHA-256 of the id.
///
/// Ids are arbitrary paths, so any character substitution would let two
/// projects share a file. The id itself is stored inside the record.
fn project_file_stem(id: &str) -> String {
    Sha256::digest(id.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn store_error(action: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::StoreUnavailable(format!("failed to {} {}: {}", action, path.display(), e))
}

/// Serialize to `<path>.tmp`, then rename over `path`
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| store_error("write", &tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| store_error("rename", path, e))?;
    Ok(())
}

/// Load every `*.json` file in a directory, skipping unreadable ones
async fn load_json_files<T: DeserializeOwned>(dir: &Path) -> Vec<T> {
    let mut items = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to read store directory");
            return items;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<T>(&content) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt store file");
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read store file");
            }
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn make_store() -> (FileMemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileMemoryStore::open(dir.path().to_path_buf()).await.unwrap();
        (store, dir)
    }

    fn memory(project: &str, content: &str) -> MemoryRecord {
        MemoryRecordBuilder::new(project, "s1")
            .content(content)
            .importance(0.7)
            .semantic_tags(["rust"])
            .embedding(vec![0.1, 0.2])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileMemoryStore::open(dir.path().to_path_buf()).await.unwrap();
            store.ensure_project_exists("/code/app").await.unwrap();
            store.store_memory(memory("/code/app", "prefers tokio")).await.unwrap();
            store.mark_first_session_completed("/code/app").await.unwrap();
            store.update_project_stats("/code/app", 1, 1).await.unwrap();
            store
                .store_session_summary(SessionSummary {
                    session_id: "s1".into(),
                    project_id: "/code/app".into(),
                    summary: "Set up the runtime".into(),
                    interaction_tone: "collaborative".into(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let store = FileMemoryStore::open(dir.path().to_path_buf()).await.unwrap();
        let memories = store.get_all_curated_memories("/code/app").await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].content, "prefers tokio");
        assert_eq!(memories[0].metadata.semantic_tags, vec!["rust"]);
        assert!(!store.is_first_session_for_project("/code/app").await.unwrap());
        let summary = store.get_last_session_summary("/code/app").await.unwrap().unwrap();
        assert_eq!(summary.interaction_tone, "collaborative");
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.projects[0].total_memories, 1);
    }

    #[tokio::test]
    async fn test_corrupt_files_are_skipped() {
        let (store, dir) = make_store().await;
        store.store_memory(memory("p", "good")).await.unwrap();
        tokio::fs::write(dir.path().join("memories").join("bad.json"), "{ not json")
            .await
            .unwrap();

        let reopened = FileMemoryStore::open(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(reopened.get_all_curated_memories("p").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (store, dir) = make_store().await;
        store.store_memory(memory("p", "one")).await.unwrap();
        let mut entries = tokio::fs::read_dir(dir.path().join("memories")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert_eq!(
                entry.path().extension().and_then(|e| e.to_str()),
                Some("json")
            );
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_store_unavailable() {
        let (store, dir) = make_store().await;
        std::fs::remove_dir_all(dir.path().join("memories")).unwrap();
        let result = store.store_memory(memory("p", "lost")).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
        assert!(store.get_all_curated_memories("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_project_ids_do_not_collide() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileMemoryStore::open(dir.path().to_path_buf()).await.unwrap();
            store.ensure_project_exists("/work/a/b").await.unwrap();
            store.mark_first_session_completed("/work/a/b").await.unwrap();
            store.ensure_project_exists("/work/a_b").await.unwrap();
        }

        let store = FileMemoryStore::open(dir.path().to_path_buf()).await.unwrap();
        assert!(!store.is_first_session_for_project("/work/a/b").await.unwrap());
        assert!(store.is_first_session_for_project("/work/a_b").await.unwrap());
        assert_eq!(store.stats().await.unwrap().total_projects, 2);
    }

    #[test]
    fn test_project_file_stem() {
        assert_ne!(project_file_stem("/work/a/b"), project_file_stem("/work/a_b"));
        assert_eq!(project_file_stem("app"), project_file_stem("app"));
        assert_eq!(project_file_stem("app").len(), 64);
    }
}
