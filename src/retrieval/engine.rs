//! Two-stage memory selection

use super::scoring::{Query, ScoreBreakdown, ScoringEngine, RELEVANCE_GATE};
use super::strategy::{RankRequest, RetrievalStrategy, SelectedMemory, SelectionTier};
use crate::config::SelectionMode;
use crate::error::Result;
use crate::memory::{Embedder, MemoryRecord, MemoryStore, TemporalRelevance};
use crate::session::SessionState;
use std::collections::HashSet;
use std::sync::Arc;

/// Selects memories for one incoming message.
///
/// Stage 1 takes must-include memories (action items, persistent and very
/// important facts) that are at least plausibly about the query. Stage 2
/// hands the rest to the configured strategy.
pub struct RetrievalEngine {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    strategy: Arc<dyn RetrievalStrategy>,
    scoring: ScoringEngine,
    obligatory_cap: usize,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        strategy: Arc<dyn RetrievalStrategy>,
        obligatory_cap: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            strategy,
            scoring: ScoringEngine::new(),
            obligatory_cap,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Select memories for `query_text` and mark them injected in `session`
    pub async fn select(
        &self,
        session: &mut SessionState,
        query_text: &str,
        max_memories: usize,
        mode: SelectionMode,
    ) -> Result<Vec<SelectedMemory>> {
        if max_memories == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<MemoryRecord> = self
            .store
            .get_all_curated_memories(&session.project_id)
            .await?
            .into_iter()
            .filter(|m| !session.injected_memory_ids.contains(&m.id))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query = Query::new(query_text, self.embedder.embed(query_text).await?);

        let (obligatory, remaining) = self.obligatory(candidates, &query, max_memories);
        let mut selected = obligatory;

        if max_memories > selected.len() && !remaining.is_empty() {
            let ranked = self
                .strategy
                .rank(RankRequest {
                    candidates: remaining,
                    query: &query,
                    already_selected: &selected,
                    max_memories,
                })
                .await?;
            selected.extend(ranked);
        }

        let mut seen = HashSet::new();
        selected.retain(|s| seen.insert(s.record.id));
        selected.truncate(match mode {
            SelectionMode::Strict => max_memories,
            SelectionMode::Rich => max_memories.saturating_mul(2),
        });

        session.mark_injected(selected.iter().map(|s| s.record.id));

        tracing::debug!(
            session_id = %session.session_id,
            strategy = self.strategy.name(),
            selected = selected.len(),
            "Memories selected"
        );
        Ok(selected)
    }

    /// Split candidates into Stage 1 picks and the rest
    fn obligatory(
        &self,
        candidates: Vec<MemoryRecord>,
        query: &Query,
        max_memories: usize,
    ) -> (Vec<SelectedMemory>, Vec<MemoryRecord>) {
        let cap = self.obligatory_cap.min(max_memories);
        let mut must: Vec<(MemoryRecord, ScoreBreakdown)> = Vec::new();
        let mut remaining: Vec<MemoryRecord> = Vec::new();
        for record in candidates {
            let meta = &record.metadata;
            let required = meta.action_required
                || (meta.temporal_relevance == TemporalRelevance::Persistent
                    && meta.importance_weight > 0.85)
                || meta.importance_weight > 0.9;
            if !required || !self.scoring.passes_precheck(&record, query) {
                remaining.push(record);
                continue;
            }
            // The override skips the final-score gate, never the relevance floor
            let breakdown = self.scoring.breakdown(&record, query);
            if breakdown.relevance_score >= RELEVANCE_GATE {
                must.push((record, breakdown));
            } else {
                remaining.push(record);
            }
        }

        must.sort_by(|a, b| {
            b.0.metadata
                .importance_weight
                .total_cmp(&a.0.metadata.importance_weight)
        });
        if must.len() > cap {
            remaining.extend(must.split_off(cap).into_iter().map(|(record, _)| record));
        }

        let selected = must
            .into_iter()
            .map(|(record, breakdown)| {
                let reasoning = if record.metadata.action_required {
                    "Obligatory: action required".to_string()
                } else {
                    format!(
                        "Obligatory: importance {:.2}",
                        record.metadata.importance_weight
                    )
                };
                SelectedMemory {
                    record,
                    tier: SelectionTier::Obligatory,
                    score: breakdown.final_score,
                    reasoning,
                }
            })
            .collect();
        (selected, remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HashingEmbedder, InMemoryStore, MemoryRecordBuilder};
    use crate::retrieval::strategy::SmartVectorStrategy;

    const QUERY: &str = "I'm stuck on a bug in the JWT token refresh logic";

    async fn engine_with(memories: Vec<MemoryRecord>) -> RetrievalEngine {
        let store = Arc::new(InMemoryStore::new());
        for memory in memories {
            store.store_memory(memory).await.unwrap();
        }
        RetrievalEngine::new(
            store,
            Arc::new(HashingEmbedder::new(384)),
            Arc::new(SmartVectorStrategy::new()),
            3,
        )
    }

    fn embedded(builder: MemoryRecordBuilder, content: &str) -> MemoryRecord {
        builder
            .content(content)
            .embedding(HashingEmbedder::new(384).embed_sync(content))
            .build()
            .unwrap()
    }

    fn jwt() -> MemoryRecord {
        embedded(
            MemoryRecordBuilder::new("p", "s0")
                .importance(0.6)
                .context_type("technical_state")
                .trigger_phrases(["when debugging authentication"])
                .semantic_tags(["jwt", "authentication"])
                .problem_solution_pair(true),
            "JWT refresh tokens are rotated by the auth middleware",
        )
    }

    fn gratitude() -> MemoryRecord {
        embedded(
            MemoryRecordBuilder::new("p", "s0")
                .importance(0.95)
                .context_type("personal")
                .emotional_resonance(crate::memory::EmotionalResonance::Gratitude),
            "The user said our collaboration feels like working with a dear friend",
        )
    }

    #[tokio::test]
    async fn test_relevant_memory_wins_over_important_unrelated_one() {
        let engine = engine_with(vec![jwt(), gratitude()]).await;
        let mut session = SessionState::new("s1", "p");

        let selected = engine
            .select(&mut session, QUERY, 5, SelectionMode::Strict)
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert!(selected[0].record.content.starts_with("JWT refresh tokens"));
    }

    #[tokio::test]
    async fn test_memories_are_injected_once_per_session() {
        let engine = engine_with(vec![jwt()]).await;
        let mut session = SessionState::new("s1", "p");

        let first = engine.select(&mut session, QUERY, 5, SelectionMode::Strict).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(session.injected_memory_ids.contains(&first[0].record.id));

        let second = engine.select(&mut session, QUERY, 5, SelectionMode::Strict).await.unwrap();
        assert!(second.is_empty());

        // A different session sees it again
        let mut other = SessionState::new("s2", "p");
        let third = engine.select(&mut other, QUERY, 5, SelectionMode::Strict).await.unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn test_obligatory_cap() {
        let actions: Vec<MemoryRecord> = (0..5)
            .map(|i| {
                embedded(
                    MemoryRecordBuilder::new("p", "s0")
                        .action_required(true)
                        .trigger_phrases(["jwt token refresh"])
                        .semantic_tags(["jwt"]),
                    &format!("Rotate the JWT signing key, step {}", i),
                )
            })
            .collect();
        let engine = engine_with(actions).await;
        let mut session = SessionState::new("s1", "p");

        let selected = engine
            .select(&mut session, QUERY, 5, SelectionMode::Strict)
            .await
            .unwrap();
        let obligatory = selected
            .iter()
            .filter(|s| s.tier == SelectionTier::Obligatory)
            .count();
        assert_eq!(obligatory, 3);
        assert_eq!(selected.len(), 5);
    }

    #[tokio::test]
    async fn test_obligatory_requires_precheck() {
        // Action item with no connection to the query
        let unrelated = embedded(
            MemoryRecordBuilder::new("p", "s0")
                .action_required(true)
                .importance(1.0)
                .trigger_phrases(["when planning the garden"]),
            "Buy tomato seeds",
        );
        let engine = engine_with(vec![unrelated]).await;
        let mut session = SessionState::new("s1", "p");
        let selected = engine
            .select(&mut session, QUERY, 5, SelectionMode::Strict)
            .await
            .unwrap();
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn test_obligatory_still_needs_relevance_floor() {
        // One tag hit and a verbatim question type clear the pre-check, but
        // the weighted relevance is 0.05·0.1 + 0.05·0.8 = 0.045.
        let weak = MemoryRecordBuilder::new("p", "s0")
            .content("Run the release checklist before shipping")
            .action_required(true)
            .importance(1.0)
            .semantic_tags([
                "deploy",
                "kubernetes",
                "helm",
                "terraform",
                "grafana",
                "postgres",
                "redis",
                "kafka",
                "nginx",
                "vault",
            ])
            .question_types(["how do we deploy"])
            .build()
            .unwrap();
        let query = Query::new("how do we deploy?", vec![]);
        let scoring = ScoringEngine::new();
        assert!(scoring.passes_precheck(&weak, &query));
        let breakdown = scoring.breakdown(&weak, &query);
        assert!(breakdown.relevance_score < RELEVANCE_GATE);

        let engine = engine_with(vec![weak]).await;
        let mut session = SessionState::new("s1", "p");
        let selected = engine
            .select(&mut session, "how do we deploy?", 5, SelectionMode::Strict)
            .await
            .unwrap();
        assert!(selected.is_empty());
        assert!(session.injected_memory_ids.is_empty());
    }

    #[tokio::test]
    async fn test_selected_memories_clear_relevance_floor() {
        let engine = engine_with(vec![jwt(), gratitude()]).await;
        let mut session = SessionState::new("s1", "p");
        let query = Query::new(QUERY, HashingEmbedder::new(384).embed_sync(QUERY));
        let scoring = ScoringEngine::new();
        for mode in [SelectionMode::Strict, SelectionMode::Rich] {
            let selected = engine.select(&mut session, QUERY, 5, mode).await.unwrap();
            for memory in selected {
                assert!(scoring.breakdown(&memory.record, &query).relevance_score >= RELEVANCE_GATE);
            }
        }
    }

    #[tokio::test]
    async fn test_huge_budget_does_not_overflow() {
        let engine = engine_with(vec![jwt()]).await;
        for mode in [SelectionMode::Strict, SelectionMode::Rich] {
            let mut session = SessionState::new("s1", "p");
            let selected = engine
                .select(&mut session, QUERY, usize::MAX / 2, mode)
                .await
                .unwrap();
            assert_eq!(selected.len(), 1);

            let mut session = SessionState::new("s2", "p");
            let selected = engine.select(&mut session, QUERY, usize::MAX, mode).await.unwrap();
            assert_eq!(selected.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_strict_and_rich_budgets() {
        let related: Vec<MemoryRecord> = (0..8)
            .map(|i| {
                embedded(
                    MemoryRecordBuilder::new("p", "s0")
                        .importance(0.7)
                        .context_type("technical_state")
                        .trigger_phrases(["jwt token refresh"])
                        .semantic_tags(["jwt"]),
                    &format!("JWT detail number {}", i),
                )
            })
            .collect();

        let engine = engine_with(related.clone()).await;
        let mut session = SessionState::new("s1", "p");
        let strict = engine.select(&mut session, QUERY, 2, SelectionMode::Strict).await.unwrap();
        assert_eq!(strict.len(), 2);

        let engine = engine_with(related).await;
        let mut session = SessionState::new("s1", "p");
        let rich = engine.select(&mut session, QUERY, 2, SelectionMode::Rich).await.unwrap();
        assert_eq!(rich.len(), 4);
    }

    #[tokio::test]
    async fn test_zero_budget_and_empty_project() {
        let engine = engine_with(vec![jwt()]).await;
        let mut session = SessionState::new("s1", "p");
        assert!(engine.select(&mut session, QUERY, 0, SelectionMode::Strict).await.unwrap().is_empty());

        let mut elsewhere = SessionState::new("s1", "other-project");
        assert!(engine.select(&mut elsewhere, QUERY, 5, SelectionMode::Strict).await.unwrap().is_empty());
    }
}
