//! Per-session state and its registry

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Where a session sits in the project's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Created, no context request served yet
    Uninitialized,
    /// The project has no curated memories yet; nothing is injected
    FirstSession,
    /// Primer delivered or memories being retrieved
    Ongoing,
}

/// Mutable state of one conversation session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub project_id: String,
    pub message_count: u64,
    pub started_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub primer_delivered: bool,
    /// Memories already shown in this session; never injected twice
    pub injected_memory_ids: HashSet<Uuid>,
    pub phase: SessionPhase,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            project_id: project_id.into(),
            message_count: 0,
            started_at: now,
            last_active: now,
            primer_delivered: false,
            injected_memory_ids: HashSet::new(),
            phase: SessionPhase::Uninitialized,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn mark_injected<I: IntoIterator<Item = Uuid>>(&mut self, ids: I) {
        self.injected_memory_ids.extend(ids);
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            project_id: self.project_id.clone(),
            message_count: self.message_count,
            started_at: self.started_at,
            last_active: self.last_active,
            primer_delivered: self.primer_delivered,
            injected_memories: self.injected_memory_ids.len(),
            phase: self.phase,
        }
    }
}

/// Serializable view of a session for listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub project_id: String,
    pub message_count: u64,
    pub started_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub primer_delivered: bool,
    pub injected_memories: usize,
    pub phase: SessionPhase,
}

pub type SharedSession = Arc<Mutex<SessionState>>;

/// Registry of live sessions with idle expiry.
///
/// The map lock is held only for lookups and inserts; each session has its
/// own mutex, so concurrent sessions never wait on each other.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fetch a session, creating it on first reference
    pub async fn get_or_create(&self, session_id: &str, project_id: &str) -> SharedSession {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id, project_id, "Created session");
            Arc::new(Mutex::new(SessionState::new(session_id, project_id)))
        });
        Arc::clone(session)
    }

    pub async fn get(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Drop a session explicitly; returns whether it existed
    pub async fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "Closed session");
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.lock().await.info());
        }
        infos.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        infos
    }

    /// Remove sessions idle for longer than the TTL
    pub async fn evict_expired(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let now = Utc::now();
        let sessions: Vec<(String, SharedSession)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), Arc::clone(s)))
            .collect();

        let mut expired = Vec::new();
        for (id, session) in sessions {
            if now - session.lock().await.last_active > ttl {
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            let mut map = self.sessions.write().await;
            for id in &expired {
                map.remove(id);
            }
            tracing::info!(count = expired.len(), "Evicted idle sessions");
        }
        expired.len()
    }

    /// Periodically evict idle sessions until cancelled
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.evict_expired().await;
                    }
                    _ = cancel.cancelled() => {
                        tracing::debug!("Session reaper stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.get_or_create("s1", "p").await;
        a.lock().await.message_count = 3;
        let b = store.get_or_create("s1", "other").await;
        assert_eq!(b.lock().await.message_count, 3);
        assert_eq!(b.lock().await.project_id, "p");
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_close() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.get_or_create("s1", "p").await;
        assert!(store.close("s1").await);
        assert!(!store.close("s1").await);
        assert!(store.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = SessionStore::new(Duration::from_secs(60));
        let stale = store.get_or_create("stale", "p").await;
        stale.lock().await.last_active = Utc::now() - chrono::Duration::minutes(5);
        store.get_or_create("fresh", "p").await;

        assert_eq!(store.evict_expired().await, 1);
        assert!(store.get("stale").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_list_reports_state() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.get_or_create("s1", "p").await;
        session.lock().await.mark_injected([Uuid::new_v4(), Uuid::new_v4()]);

        let infos = store.list().await;
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].injected_memories, 2);
        assert_eq!(infos[0].phase, SessionPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_reaper_stops_on_cancel() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        let handle = store.spawn_reaper(Duration::from_millis(10), cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
