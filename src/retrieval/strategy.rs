//! Stage 2 ranking strategies
//!
//! A strategy receives the candidates that survived Stage 1 and decides which
//! of them to inject. `SmartVector` is pure scoring; `Agent` and `Hybrid` ask
//! the external agent to pick among gated candidates and fall back to scoring
//! whenever the agent fails.

use super::scoring::{Query, ScoredMemory, ScoringEngine};
use super::text;
use crate::config::RetrievalMode;
use crate::curator::prompt::{selection_user_message, SELECTION_SYSTEM_PROMPT};
use crate::curator::{AgentBackend, AgentRequest, ResponseParser};
use crate::error::{Error, Result};
use crate::memory::MemoryRecord;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why a memory made it into the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTier {
    /// Stage 1 must-include
    Obligatory,
    /// Tier A
    Critical,
    /// Tier B, or picked by the agent
    Scored,
    /// Tier C, related to something already selected
    Context,
}

impl SelectionTier {
    /// Marker rendered in front of the memory line
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Self::Obligatory | Self::Critical => Some("[CRITICAL]"),
            Self::Scored => None,
            Self::Context => Some("[CONTEXT]"),
        }
    }
}

/// A memory chosen for injection
#[derive(Debug, Clone)]
pub struct SelectedMemory {
    pub record: MemoryRecord,
    pub tier: SelectionTier,
    pub score: f32,
    pub reasoning: String,
}

/// Input to a ranking pass
pub struct RankRequest<'a> {
    /// Candidates not yet injected and not taken by Stage 1
    pub candidates: Vec<MemoryRecord>,
    pub query: &'a Query,
    /// Stage 1 picks; they count against every tier budget
    pub already_selected: &'a [SelectedMemory],
    pub max_memories: usize,
}

#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    async fn rank(&self, request: RankRequest<'_>) -> Result<Vec<SelectedMemory>>;

    fn name(&self) -> &'static str;
}

/// Build the strategy named by the config
pub fn build_strategy(
    mode: RetrievalMode,
    backend: Arc<dyn AgentBackend>,
    cancel: CancellationToken,
) -> Result<Arc<dyn RetrievalStrategy>> {
    Ok(match mode {
        RetrievalMode::SmartVector => Arc::new(SmartVectorStrategy::new()),
        RetrievalMode::Agent => Arc::new(AgentStrategy::new(backend, cancel)?),
        RetrievalMode::Hybrid => Arc::new(HybridStrategy::new(backend, cancel)?),
    })
}

// =============================================================================
// Scoring and tiers
// =============================================================================

/// Score every candidate, drop the ones that fail the gate, best first
pub fn score_and_gate(
    scoring: &ScoringEngine,
    candidates: Vec<MemoryRecord>,
    query: &Query,
) -> Vec<ScoredMemory> {
    let mut scored: Vec<ScoredMemory> = candidates
        .into_iter()
        .map(|record| scoring.score(record, query))
        .filter(|s| s.breakdown.passes_gate)
        .collect();
    scored.sort_by(|a, b| b.final_score().total_cmp(&a.final_score()));
    scored
}

fn is_tier_a(memory: &ScoredMemory) -> bool {
    let b = &memory.breakdown;
    b.final_score > 0.8
        || b.components.peak() > 0.9
        || memory.record.metadata.importance_weight > 0.9
        || memory.record.metadata.action_required
}

/// Fill tiers A, B and C from sorted, gated memories.
///
/// Budgets count `already_selected`: tier A stops at `max`, tier B at
/// `⌊1.5·max⌋`, tier C at `2·max`.
pub fn fill_tiers(
    scored: Vec<ScoredMemory>,
    already_selected: &[SelectedMemory],
    max_memories: usize,
) -> Vec<SelectedMemory> {
    let cap_a = max_memories;
    let cap_b = max_memories.saturating_add(max_memories / 2);
    let cap_c = max_memories.saturating_mul(2);

    let mut taken = vec![false; scored.len()];
    let mut picked: Vec<SelectedMemory> = Vec::new();
    let total = |picked: &Vec<SelectedMemory>| already_selected.len() + picked.len();

    let select = |m: &ScoredMemory, tier: SelectionTier| SelectedMemory {
        record: m.record.clone(),
        tier,
        score: m.final_score(),
        reasoning: m.breakdown.reasoning.clone(),
    };

    for (i, memory) in scored.iter().enumerate() {
        if total(&picked) >= cap_a {
            break;
        }
        if is_tier_a(memory) {
            picked.push(select(memory, SelectionTier::Critical));
            taken[i] = true;
        }
    }

    let mut seen_types: HashSet<String> = already_selected
        .iter()
        .chain(picked.iter())
        .map(|s| s.record.metadata.context_type.clone())
        .collect();
    for (i, memory) in scored.iter().enumerate() {
        if total(&picked) >= cap_b {
            break;
        }
        if taken[i] {
            continue;
        }
        let meta = &memory.record.metadata;
        if memory.final_score() > 0.5
            || !seen_types.contains(&meta.context_type)
            || !meta.emotional_resonance.is_none()
        {
            seen_types.insert(meta.context_type.clone());
            picked.push(select(memory, SelectionTier::Scored));
            taken[i] = true;
        }
    }

    for (i, memory) in scored.iter().enumerate() {
        if total(&picked) >= cap_c {
            break;
        }
        if taken[i] {
            continue;
        }
        let related = already_selected
            .iter()
            .chain(picked.iter())
            .any(|s| shares_topic(&s.record, &memory.record));
        if related {
            picked.push(select(memory, SelectionTier::Context));
            taken[i] = true;
        }
    }

    picked
}

fn shares_topic(a: &MemoryRecord, b: &MemoryRecord) -> bool {
    let (a, b) = (&a.metadata, &b.metadata);
    if !a.knowledge_domain.is_empty() && a.knowledge_domain.eq_ignore_ascii_case(&b.knowledge_domain)
    {
        return true;
    }
    a.semantic_tags.iter().any(|t| b.semantic_tags.contains(t))
}

/// Pure multi-factor scoring with tiered selection
#[derive(Debug, Clone, Default)]
pub struct SmartVectorStrategy {
    scoring: ScoringEngine,
}

impl SmartVectorStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetrievalStrategy for SmartVectorStrategy {
    async fn rank(&self, request: RankRequest<'_>) -> Result<Vec<SelectedMemory>> {
        let scored = score_and_gate(&self.scoring, request.candidates, request.query);
        Ok(fill_tiers(scored, request.already_selected, request.max_memories))
    }

    fn name(&self) -> &'static str {
        "smart_vector"
    }
}

// =============================================================================
// Agent-assisted selection
// =============================================================================

/// Asks the external agent which of the given memories to inject
struct AgentSelector {
    backend: Arc<dyn AgentBackend>,
    parser: ResponseParser,
    cancel: CancellationToken,
}

impl AgentSelector {
    fn new(backend: Arc<dyn AgentBackend>, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            backend,
            parser: ResponseParser::new()?,
            cancel,
        })
    }

    async fn pick(
        &self,
        query: &Query,
        pool: &[ScoredMemory],
        limit: usize,
    ) -> Result<Vec<SelectedMemory>> {
        let records: Vec<MemoryRecord> = pool.iter().map(|s| s.record.clone()).collect();
        let request = AgentRequest {
            system_prompt: SELECTION_SYSTEM_PROMPT.to_string(),
            user_message: selection_user_message(&query.text, &records, limit),
            session_handle: None,
            cwd: None,
        };
        let reply = self.backend.invoke(request, self.cancel.child_token()).await?;
        let value = self.parser.parse_value(&reply)?;

        let (indices, reasoning) = match &value {
            Value::Object(obj) => (
                obj.get("selected").cloned().unwrap_or(Value::Null),
                obj.get("reasoning")
                    .and_then(Value::as_str)
                    .unwrap_or("Selected by agent")
                    .to_string(),
            ),
            Value::Array(_) => (value.clone(), "Selected by agent".to_string()),
            _ => (Value::Null, String::new()),
        };
        let indices = indices.as_array().ok_or_else(|| {
            Error::MalformedAgentResponse("selection reply has no 'selected' list".to_string())
        })?;

        let mut seen = HashSet::new();
        let picked: Vec<SelectedMemory> = indices
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|i| pool.get(i as usize))
            .filter(|m| seen.insert(m.record.id))
            .take(limit)
            .map(|m| SelectedMemory {
                record: m.record.clone(),
                tier: if is_tier_a(m) {
                    SelectionTier::Critical
                } else {
                    SelectionTier::Scored
                },
                score: m.final_score(),
                reasoning: reasoning.clone(),
            })
            .collect();

        tracing::debug!(
            backend = self.backend.name(),
            offered = pool.len(),
            picked = picked.len(),
            "Agent selection complete"
        );
        Ok(picked)
    }
}

/// The agent picks among all gated candidates
pub struct AgentStrategy {
    scoring: ScoringEngine,
    selector: AgentSelector,
}

impl AgentStrategy {
    pub fn new(backend: Arc<dyn AgentBackend>, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            scoring: ScoringEngine::new(),
            selector: AgentSelector::new(backend, cancel)?,
        })
    }
}

#[async_trait]
impl RetrievalStrategy for AgentStrategy {
    async fn rank(&self, request: RankRequest<'_>) -> Result<Vec<SelectedMemory>> {
        let scored = score_and_gate(&self.scoring, request.candidates, request.query);
        if scored.is_empty() {
            return Ok(Vec::new());
        }
        let limit = request
            .max_memories
            .saturating_sub(request.already_selected.len());

        match self.selector.pick(request.query, &scored, limit).await {
            Ok(picked) => Ok(picked),
            Err(e) => {
                tracing::warn!(error = %e, "Agent selection failed, using vector ranking");
                Ok(fill_tiers(scored, request.already_selected, request.max_memories))
            }
        }
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}

/// Vector ranking with a doubled budget; complex queries let the agent pick
/// from that shortlist
pub struct HybridStrategy {
    scoring: ScoringEngine,
    selector: AgentSelector,
}

impl HybridStrategy {
    pub fn new(backend: Arc<dyn AgentBackend>, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            scoring: ScoringEngine::new(),
            selector: AgentSelector::new(backend, cancel)?,
        })
    }
}

#[async_trait]
impl RetrievalStrategy for HybridStrategy {
    async fn rank(&self, request: RankRequest<'_>) -> Result<Vec<SelectedMemory>> {
        let scored = score_and_gate(&self.scoring, request.candidates, request.query);
        let shortlist = fill_tiers(
            scored,
            request.already_selected,
            request.max_memories.saturating_mul(2),
        );
        if shortlist.is_empty() || !text::is_complex_query(&request.query.text) {
            return Ok(shortlist);
        }

        let pool: Vec<ScoredMemory> = shortlist
            .iter()
            .map(|s| self.scoring.score(s.record.clone(), request.query))
            .collect();
        let limit = request
            .max_memories
            .saturating_sub(request.already_selected.len());

        match self.selector.pick(request.query, &pool, limit).await {
            Ok(picked) if !picked.is_empty() => Ok(picked),
            Ok(_) => Ok(shortlist),
            Err(e) => {
                tracing::warn!(error = %e, "Agent escalation failed, using vector shortlist");
                Ok(shortlist)
            }
        }
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
