//! Session coordination
//!
//! Ties the store, retrieval engine and curator together behind the three
//! operations a host calls: `get_context` before each message,
//! `track_message` after it, and `checkpoint` at session end or compaction.

use super::manager::{SessionInfo, SessionPhase, SessionStore};
use super::primer::{build_primer, PrimerInput};
use crate::config::{MemoriaConfig, PrimerConfig, SelectionMode};
use crate::curator::{
    AgentBackend, CandidateMemory, CliAgent, CurationSource, CurationTrigger, Curator,
};
use crate::error::{Error, Result};
use crate::memory::{
    build_embedder, open_store, EmotionalResonance, Embedder, MemoryRecord, MemoryRecordBuilder,
    MemoryStore, ProjectSnapshot, SessionSummary, StoreStats, TemporalRelevance,
};
use crate::retrieval::{build_strategy, format_context, RetrievalEngine, SelectedMemory};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What kind of context was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Empty,
    Primer,
    Memories,
}

/// Result of a context request
#[derive(Debug, Clone)]
pub struct ContextResult {
    pub session_id: String,
    pub message_count: u64,
    pub context_text: String,
    pub kind: ContextKind,
    pub memories: Vec<SelectedMemory>,
}

impl ContextResult {
    fn empty(session_id: &str, message_count: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            message_count,
            context_text: String::new(),
            kind: ContextKind::Empty,
            memories: Vec::new(),
        }
    }

    pub fn has_memories(&self) -> bool {
        !self.context_text.is_empty()
    }
}

/// What a checkpoint stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointOutcome {
    pub memories_curated: usize,
    pub summary_stored: bool,
    pub snapshot_stored: bool,
    pub first_session_completed: bool,
}

/// Store statistics plus live session count
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub active_sessions: usize,
    pub retrieval_strategy: String,
}

pub struct SessionCoordinator {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    retrieval: RetrievalEngine,
    curator: Curator,
    sessions: Arc<SessionStore>,
    max_memories: usize,
    selection: SelectionMode,
    primer: PrimerConfig,
    shutdown: CancellationToken,
}

impl SessionCoordinator {
    /// Assemble a coordinator from explicit parts
    pub fn new(
        config: &MemoriaConfig,
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn AgentBackend>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let strategy = build_strategy(config.retrieval.mode, Arc::clone(&backend), shutdown.clone())?;
        let retrieval = RetrievalEngine::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            strategy,
            config.retrieval.obligatory_cap,
        );
        Ok(Self {
            store,
            embedder,
            retrieval,
            curator: Curator::new(backend)?,
            sessions: Arc::new(SessionStore::new(Duration::from_secs(config.session.ttl_secs))),
            max_memories: config.retrieval.max_memories,
            selection: config.retrieval.selection,
            primer: config.primer.clone(),
            shutdown,
        })
    }

    /// Open the configured store, embedder and agent CLI
    pub async fn from_config(config: &MemoriaConfig, shutdown: CancellationToken) -> Result<Self> {
        let store = open_store(&config.storage).await?;
        let embedder = build_embedder(&config.embedding);
        let backend: Arc<dyn AgentBackend> = Arc::new(CliAgent::new(&config.curator));
        tracing::info!(
            storage = ?config.storage.backend,
            embedder = embedder.name(),
            retrieval = %config.retrieval.mode,
            curator = %config.curator.command,
            "Session coordinator ready"
        );
        Self::new(config, store, embedder, backend, shutdown)
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    // =========================================================================
    // Context
    // =========================================================================

    /// Context for the next message; failures degrade to an empty context
    pub async fn get_context(
        &self,
        session_id: &str,
        project_id: &str,
        message: &str,
        max_memories: Option<usize>,
        mode: Option<SelectionMode>,
    ) -> ContextResult {
        match self
            .try_get_context(session_id, project_id, message, max_memories, mode)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(session_id, project_id, error = %e, "Context retrieval failed");
                let count = match self.sessions.get(session_id).await {
                    Some(s) => s.lock().await.message_count,
                    None => 0,
                };
                ContextResult::empty(session_id, count)
            }
        }
    }

    pub async fn try_get_context(
        &self,
        session_id: &str,
        project_id: &str,
        message: &str,
        max_memories: Option<usize>,
        mode: Option<SelectionMode>,
    ) -> Result<ContextResult> {
        let project = self.store.ensure_project_exists(project_id).await?;
        let shared = self.sessions.get_or_create(session_id, project_id).await;
        let mut session = shared.lock().await;
        session.touch();

        if !project.first_session_completed {
            session.phase = SessionPhase::FirstSession;
            tracing::debug!(session_id, project_id, "First session for project, no context");
            return Ok(ContextResult::empty(session_id, session.message_count));
        }

        if session.message_count == 0 && !session.primer_delivered {
            let summary = self.store.get_last_session_summary(project_id).await?;
            let snapshot = self.store.get_last_project_snapshot(project_id).await?;
            let memories = self.store.get_all_curated_memories(project_id).await?;
            let primer = build_primer(
                PrimerInput {
                    project: &project,
                    summary: summary.as_ref(),
                    snapshot: snapshot.as_ref(),
                    memories: &memories,
                    now: Utc::now(),
                },
                &self.primer,
            );

            session.primer_delivered = true;
            session.phase = SessionPhase::Ongoing;
            session.mark_injected(primer.essential_ids.iter().copied());
            tracing::info!(session_id, project_id, "Delivered session primer");

            return Ok(ContextResult {
                session_id: session_id.to_string(),
                message_count: session.message_count,
                context_text: primer.text,
                kind: ContextKind::Primer,
                memories: Vec::new(),
            });
        }

        session.phase = SessionPhase::Ongoing;
        let selected = self
            .retrieval
            .select(
                &mut session,
                message,
                max_memories.unwrap_or(self.max_memories),
                mode.unwrap_or(self.selection),
            )
            .await?;

        let context_text = format_context(&selected);
        Ok(ContextResult {
            session_id: session_id.to_string(),
            message_count: session.message_count,
            kind: if selected.is_empty() {
                ContextKind::Empty
            } else {
                ContextKind::Memories
            },
            context_text,
            memories: selected,
        })
    }

    /// Record that a message was exchanged; returns the new message count
    pub async fn track_message(&self, session_id: &str, project_id: &str) -> u64 {
        let shared = self.sessions.get_or_create(session_id, project_id).await;
        let mut session = shared.lock().await;
        session.message_count += 1;
        session.touch();
        session.message_count
    }

    pub async fn close_session(&self, session_id: &str) -> bool {
        self.sessions.close(session_id).await
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.list().await
    }

    pub async fn stats(&self) -> Result<CoordinatorStats> {
        Ok(CoordinatorStats {
            store: self.store.stats().await?,
            active_sessions: self.sessions.count().await,
            retrieval_strategy: self.retrieval.strategy_name().to_string(),
        })
    }

    // =========================================================================
    // Checkpoint
    // =========================================================================

    /// Curate and store; failures degrade to zero memories
    pub async fn checkpoint(
        &self,
        session_id: &str,
        project_id: &str,
        trigger: CurationTrigger,
        source: Option<CurationSource>,
    ) -> CheckpointOutcome {
        match self.try_checkpoint(session_id, project_id, trigger, source).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(session_id, project_id, %trigger, error = %e, "Checkpoint failed");
                CheckpointOutcome::default()
            }
        }
    }

    pub async fn try_checkpoint(
        &self,
        session_id: &str,
        project_id: &str,
        trigger: CurationTrigger,
        source: Option<CurationSource>,
    ) -> Result<CheckpointOutcome> {
        let Some(source) = source else {
            tracing::info!(session_id, %trigger, "Checkpoint without a curation source, nothing to curate");
            return Ok(CheckpointOutcome::default());
        };

        self.store.ensure_project_exists(project_id).await?;
        let was_first = self.store.is_first_session_for_project(project_id).await?;

        // No session or store lock is held while the agent runs
        let result = self
            .curator
            .try_curate(&source, trigger, self.shutdown.child_token())
            .await?;

        let mut outcome = CheckpointOutcome::default();
        let now = Utc::now();

        if !result.session_summary.is_empty() {
            self.store
                .store_session_summary(SessionSummary {
                    session_id: session_id.to_string(),
                    project_id: project_id.to_string(),
                    summary: result.session_summary.clone(),
                    interaction_tone: result.interaction_tone.clone(),
                    created_at: now,
                })
                .await?;
            outcome.summary_stored = true;
        }

        if !result.project_snapshot.is_empty() {
            let fields = &result.project_snapshot;
            self.store
                .store_project_snapshot(ProjectSnapshot {
                    session_id: session_id.to_string(),
                    project_id: project_id.to_string(),
                    current_phase: fields.current_phase.clone(),
                    recent_achievements: fields.recent_achievements.clone(),
                    active_challenges: fields.active_challenges.clone(),
                    created_at: now,
                })
                .await?;
            outcome.snapshot_stored = true;
        }

        let embeddings = futures::future::try_join_all(
            result
                .memories
                .iter()
                .map(|candidate| self.embedder.embed(&candidate.content)),
        )
        .await?;

        let mut write_error = None;
        for (candidate, embedding) in result.memories.iter().zip(embeddings) {
            let record = match record_from_candidate(
                candidate,
                project_id,
                session_id,
                trigger,
                source.version_label(),
                embedding,
            ) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping candidate that failed to build");
                    continue;
                }
            };
            if let Err(e) = self.store.store_memory(record).await {
                write_error = Some(e);
                break;
            }
            outcome.memories_curated += 1;
        }

        // Records already written must stay reachable, so bookkeeping runs
        // even when the write loop stopped early
        let bookkeeping = self
            .finish_checkpoint(project_id, was_first, outcome.memories_curated)
            .await;
        if let Some(e) = write_error {
            tracing::error!(
                session_id,
                project_id,
                stored = outcome.memories_curated,
                error = %e,
                "Memory write failed, checkpoint aborted"
            );
            if let Err(b) = bookkeeping {
                tracing::warn!(project_id, error = %b, "Project bookkeeping failed");
            }
            return Err(e);
        }
        outcome.first_session_completed = bookkeeping?;

        tracing::info!(
            session_id,
            project_id,
            %trigger,
            memories = outcome.memories_curated,
            summary = outcome.summary_stored,
            snapshot = outcome.snapshot_stored,
            "Checkpoint complete"
        );
        Ok(outcome)
    }

    /// Flip the first-session flag and bump project counters; returns whether
    /// the flag was flipped
    async fn finish_checkpoint(&self, project_id: &str, was_first: bool, stored: usize) -> Result<bool> {
        let flipped = stored > 0 && was_first;
        if flipped {
            self.store.mark_first_session_completed(project_id).await?;
        }
        self.store
            .update_project_stats(project_id, 1, stored as u64)
            .await?;
        Ok(flipped)
    }
}

/// Turn a validated candidate into a storable record
pub fn record_from_candidate(
    candidate: &CandidateMemory,
    project_id: &str,
    session_id: &str,
    trigger: CurationTrigger,
    curator_version: &str,
    embedding: Vec<f32>,
) -> Result<MemoryRecord> {
    if embedding.is_empty() {
        return Err(Error::Embedding("empty embedding".to_string()));
    }
    MemoryRecordBuilder::new(project_id, session_id)
        .content(candidate.content.clone())
        .reasoning(candidate.reasoning.clone())
        .embedding(embedding)
        .importance(candidate.importance_weight)
        .confidence(candidate.confidence_score)
        .context_type(candidate.context_type.clone())
        .temporal_relevance(TemporalRelevance::from_label(&candidate.temporal_relevance))
        .knowledge_domain(candidate.knowledge_domain.clone())
        .action_required(candidate.action_required)
        .semantic_tags(&candidate.semantic_tags)
        .trigger_phrases(&candidate.trigger_phrases)
        .question_types(&candidate.question_types)
        .emotional_resonance(EmotionalResonance::from_label(&candidate.emotional_resonance))
        .problem_solution_pair(candidate.problem_solution_pair)
        .trigger(trigger)
        .curator_version(curator_version)
        .build()
}
