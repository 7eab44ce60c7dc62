//! Multi-factor memory scoring
//!
//! Every memory is scored against a query on two axes:
//!
//! ```text
//! relevance = 0.10·trigger + 0.10·vector + 0.05·tag + 0.05·question          (≤ 0.30)
//! value     = 0.20·importance + 0.10·temporal + 0.10·context + 0.10·confidence
//!           + 0.10·emotion + 0.05·problem + 0.05·action                      (≤ 0.70)
//! final     = relevance + value
//! ```
//!
//! A memory survives the gate only when it is at least somewhat about the
//! query (`relevance ≥ 0.05`) and worth showing overall (`final ≥ 0.3`).
//! Importance alone can never carry an unrelated memory through.
//!
//! The Stage 1 pre-check and the full score share `relevance_signals`, so the
//! two can never disagree about what "matches the query" means.

use super::text::{self, INTERROGATIVES, PROBLEM_INDICATORS};
use crate::memory::vector::cosine_similarity;
use crate::memory::{MemoryRecord, TemporalRelevance};
use serde::Serialize;

/// Minimum relevance score to pass the gate
pub const RELEVANCE_GATE: f32 = 0.05;
/// Minimum final score to pass the gate
pub const FINAL_GATE: f32 = 0.3;
/// Minimum basic relevance for the Stage 1 pre-check
pub const PRECHECK_THRESHOLD: f32 = 0.3;

/// A query prepared once and scored against many memories
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub lower: String,
    pub tokens: Vec<String>,
    /// Tokens with stopwords removed
    pub words: Vec<String>,
    pub embedding: Vec<f32>,
}

impl Query {
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let text = text.into();
        let lower = text.to_lowercase();
        let tokens = text::tokenize(&text);
        let words = tokens
            .iter()
            .filter(|w| !text::is_stopword(w))
            .cloned()
            .collect();
        Self {
            text,
            lower,
            tokens,
            words,
            embedding,
        }
    }

    fn has_interrogative(&self, word: &str) -> bool {
        self.tokens.iter().any(|t| t == word)
    }
}

/// The query-matching signals shared by the pre-check and the full score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RelevanceSignals {
    pub trigger: f32,
    pub vector: f32,
    pub tag: f32,
    pub question: f32,
}

impl RelevanceSignals {
    /// Cheap Stage 1 relevance: threshold-based bonuses on the same signals
    pub fn basic_relevance(&self, query: &Query) -> f32 {
        let mut score = 0.0;
        if self.trigger > 0.5 {
            score += 0.4;
        }
        if self.vector > 0.7 {
            score += 0.3;
        }
        if self.tag > 0.0 {
            score += 0.2;
        }
        if self.question >= 0.8 && query.text.contains('?') {
            score += 0.1;
        }
        score
    }
}

/// Every factor that went into a score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreComponents {
    pub trigger: f32,
    pub vector: f32,
    pub tag: f32,
    pub question: f32,
    pub importance: f32,
    pub temporal: f32,
    pub context: f32,
    pub confidence: f32,
    pub emotion: f32,
    pub problem: f32,
    pub action: f32,
}

impl ScoreComponents {
    /// Components paired with their human-readable labels.
    ///
    /// Confidence is a property of the curation, not of the match, so it is
    /// left out of both the reasoning and the peak check.
    pub fn labeled(&self) -> [(&'static str, f32); 10] {
        [
            ("trigger phrase match", self.trigger),
            ("semantic similarity", self.vector),
            ("high importance", self.importance),
            ("question type match", self.question),
            ("context alignment", self.context),
            ("temporal relevance", self.temporal),
            ("tag match", self.tag),
            ("emotional resonance", self.emotion),
            ("problem-solution", self.problem),
            ("action required", self.action),
        ]
    }

    /// Largest single component (excluding confidence)
    pub fn peak(&self) -> f32 {
        self.labeled()
            .iter()
            .map(|(_, v)| *v)
            .fold(0.0, f32::max)
    }
}

/// Full scoring result for one memory
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub components: ScoreComponents,
    pub relevance_score: f32,
    pub value_score: f32,
    pub final_score: f32,
    pub passes_gate: bool,
    pub reasoning: String,
}

/// A memory together with its score
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub breakdown: ScoreBreakdown,
}

impl ScoredMemory {
    pub fn final_score(&self) -> f32 {
        self.breakdown.final_score
    }
}

/// Deterministic, side-effect free scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute the query-matching signals for a memory
    pub fn relevance_signals(&self, memory: &MemoryRecord, query: &Query) -> RelevanceSignals {
        RelevanceSignals {
            trigger: trigger_match(&memory.metadata.trigger_phrases, query),
            vector: vector_similarity(&query.embedding, &memory.embedding),
            tag: tag_match(&memory.metadata.semantic_tags, query),
            question: question_match(&memory.metadata.question_types, query),
        }
    }

    /// Stage 1 pre-check: is the memory plausibly about this query at all?
    pub fn passes_precheck(&self, memory: &MemoryRecord, query: &Query) -> bool {
        self.relevance_signals(memory, query).basic_relevance(query) >= PRECHECK_THRESHOLD
    }

    /// Full multi-factor score
    pub fn breakdown(&self, memory: &MemoryRecord, query: &Query) -> ScoreBreakdown {
        let signals = self.relevance_signals(memory, query);
        let meta = &memory.metadata;

        let components = ScoreComponents {
            trigger: signals.trigger,
            vector: signals.vector,
            tag: signals.tag,
            question: signals.question,
            importance: meta.importance_weight.clamp(0.0, 1.0),
            temporal: temporal_score(meta.temporal_relevance),
            context: context_alignment(&meta.context_type, query),
            confidence: meta.confidence_score.clamp(0.0, 1.0),
            emotion: emotion_score(meta.emotional_resonance.as_str(), query),
            problem: problem_solution_score(meta.problem_solution_pair, query),
            action: if meta.action_required { 0.3 } else { 0.0 },
        };

        let relevance_score = (0.10 * components.trigger
            + 0.10 * components.vector
            + 0.05 * components.tag
            + 0.05 * components.question)
            .clamp(0.0, 0.3);
        let value_score = (0.20 * components.importance
            + 0.10 * components.temporal
            + 0.10 * components.context
            + 0.10 * components.confidence
            + 0.10 * components.emotion
            + 0.05 * components.problem
            + 0.05 * components.action)
            .clamp(0.0, 0.7);
        let final_score = (relevance_score + value_score).clamp(0.0, 1.0);
        let passes_gate = relevance_score >= RELEVANCE_GATE && final_score >= FINAL_GATE;

        ScoreBreakdown {
            reasoning: generate_reasoning(&components),
            components,
            relevance_score,
            value_score,
            final_score,
            passes_gate,
        }
    }

    /// Score an owned record
    pub fn score(&self, record: MemoryRecord, query: &Query) -> ScoredMemory {
        let breakdown = self.breakdown(&record, query);
        ScoredMemory { record, breakdown }
    }
}

fn vector_similarity(query: &[f32], memory: &[f32]) -> f32 {
    cosine_similarity(query, memory).clamp(0.0, 1.0)
}

/// Best fuzzy match of any trigger phrase against the query
fn trigger_match(phrases: &[String], query: &Query) -> f32 {
    phrases
        .iter()
        .map(|phrase| {
            let phrase_lower = phrase.trim().to_lowercase();
            if phrase_lower.is_empty() {
                return 0.0;
            }
            if query.lower.contains(&phrase_lower) {
                return 1.0;
            }
            let key_words = text::content_words(&phrase_lower);
            if key_words.is_empty() {
                return 0.0;
            }
            let found = key_words
                .iter()
                .filter(|k| text::word_found(k, &query.words))
                .count();
            found as f32 / key_words.len() as f32
        })
        .fold(0.0, f32::max)
}

/// Fraction of tags that occur in the query
fn tag_match(tags: &[String], query: &Query) -> f32 {
    let tags: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        return 0.0;
    }
    let hits = tags.iter().filter(|t| query.lower.contains(t.as_str())).count();
    hits as f32 / tags.len() as f32
}

fn question_match(question_types: &[String], query: &Query) -> f32 {
    let mut best: f32 = 0.0;
    for question in question_types {
        let q = question.trim().to_lowercase();
        if q.is_empty() {
            continue;
        }
        if query.lower.contains(&q) {
            return 0.8;
        }
        let q_tokens = text::tokenize(&q);
        let shared = INTERROGATIVES
            .iter()
            .any(|w| query.has_interrogative(w) && q_tokens.iter().any(|t| t == w));
        if shared {
            best = best.max(0.5);
        }
    }
    best
}

fn context_alignment(context_type: &str, query: &Query) -> f32 {
    let keywords = text::context_keywords(context_type);
    let hits = text::count_keywords(&query.lower, &query.tokens, keywords);
    if hits > 0 {
        (0.3 + 0.2 * hits as f32).min(1.0)
    } else {
        0.1
    }
}

fn temporal_score(relevance: TemporalRelevance) -> f32 {
    match relevance {
        TemporalRelevance::Persistent => 0.8,
        TemporalRelevance::Session => 0.6,
        TemporalRelevance::Temporary => 0.3,
        TemporalRelevance::Unknown => 0.5,
    }
}

fn emotion_score(emotion: &str, query: &Query) -> f32 {
    let keywords = text::emotion_keywords(emotion);
    if text::count_keywords(&query.lower, &query.tokens, keywords) > 0 {
        0.7
    } else {
        0.0
    }
}

fn problem_solution_score(is_pair: bool, query: &Query) -> f32 {
    if is_pair && text::count_keywords(&query.lower, &query.tokens, PROBLEM_INDICATORS) > 0 {
        0.8
    } else {
        0.0
    }
}

/// Human-readable explanation built from the strongest factors
pub fn generate_reasoning(components: &ScoreComponents) -> String {
    let mut factors = components.labeled().to_vec();
    factors.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut parts = Vec::new();
    if let Some((label, value)) = factors.first() {
        if *value > 0.5 {
            parts.push(format!("Strong {} ({:.2})", label, value));
        } else if *value > 0.3 {
            parts.push(format!("{} ({:.2})", capitalize(label), value));
        }
    }
    for (label, value) in factors.iter().skip(1).take(2) {
        if *value > 0.3 {
            parts.push(format!("{} ({:.2})", label, value));
        }
    }

    if parts.is_empty() {
        "Selected based on combined factors".to_string()
    } else {
        format!("Selected due to: {}", parts.join(", "))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{EmotionalResonance, HashingEmbedder, MemoryRecordBuilder};

    const QUERY: &str = "I'm stuck on a bug in the JWT token refresh logic";

    fn query(embedder: &HashingEmbedder, text: &str) -> Query {
        Query::new(text, embedder.embed_sync(text))
    }

    fn jwt_memory(embedder: &HashingEmbedder) -> MemoryRecord {
        let content = "JWT refresh tokens are rotated by the auth middleware; expired tokens caused the 401 loop";
        MemoryRecordBuilder::new("p", "s0")
            .content(content)
            .embedding(embedder.embed_sync(content))
            .importance(0.6)
            .context_type("technical_state")
            .trigger_phrases(["when debugging authentication"])
            .semantic_tags(["jwt", "authentication"])
            .problem_solution_pair(true)
            .build()
            .unwrap()
    }

    fn gratitude_memory(embedder: &HashingEmbedder) -> MemoryRecord {
        let content = "The user said our collaboration feels like working with a dear friend";
        MemoryRecordBuilder::new("p", "s0")
            .content(content)
            .embedding(embedder.embed_sync(content))
            .importance(0.95)
            .context_type("personal")
            .emotional_resonance(EmotionalResonance::Gratitude)
            .build()
            .unwrap()
    }

    #[test]
    fn test_jwt_memory_passes_gate() {
        let embedder = HashingEmbedder::new(384);
        let q = query(&embedder, QUERY);
        let b = ScoringEngine::new().breakdown(&jwt_memory(&embedder), &q);

        assert!((b.components.trigger - 0.5).abs() < 1e-6);
        assert!((b.components.tag - 0.5).abs() < 1e-6);
        assert_eq!(b.components.problem, 0.8);
        assert!((b.components.context - 0.5).abs() < 1e-6);
        assert!(b.relevance_score >= RELEVANCE_GATE);
        assert!(b.passes_gate);
    }

    #[test]
    fn test_important_but_unrelated_memory_is_gated() {
        let embedder = HashingEmbedder::new(384);
        let q = query(&embedder, QUERY);
        let b = ScoringEngine::new().breakdown(&gratitude_memory(&embedder), &q);

        assert_eq!(b.components.trigger, 0.0);
        assert_eq!(b.components.tag, 0.0);
        assert!(b.relevance_score < RELEVANCE_GATE);
        assert!(!b.passes_gate);
    }

    #[test]
    fn test_gate_is_monotone_in_relevance() {
        // Maximal value with zero relevance never passes
        let memory = MemoryRecordBuilder::new("p", "s")
            .content("x")
            .importance(1.0)
            .confidence(1.0)
            .action_required(true)
            .build()
            .unwrap();
        let q = Query::new("completely different words", vec![]);
        let b = ScoringEngine::new().breakdown(&memory, &q);
        assert!(b.value_score > 0.3);
        assert_eq!(b.relevance_score, 0.0);
        assert!(!b.passes_gate);
    }

    #[test]
    fn test_scores_are_bounded() {
        let memory = MemoryRecordBuilder::new("p", "s")
            .content("everything matches")
            .embedding(vec![1.0, 0.0])
            .importance(1.0)
            .confidence(1.0)
            .context_type("technical_state")
            .trigger_phrases(["fix the bug"])
            .semantic_tags(["bug", "fix"])
            .question_types(["how do i fix the bug"])
            .emotional_resonance(EmotionalResonance::Frustration)
            .problem_solution_pair(true)
            .action_required(true)
            .build()
            .unwrap();
        let q = Query::new(
            "how do i fix the bug? stuck with this error in the code function",
            vec![1.0, 0.0],
        );
        let b = ScoringEngine::new().breakdown(&memory, &q);
        assert!(b.relevance_score <= 0.3 + 1e-6);
        assert!(b.value_score <= 0.7 + 1e-6);
        assert!(b.final_score <= 1.0);
        // Question matches top out at 0.8, so relevance peaks just under its cap
        assert!((b.relevance_score - 0.29).abs() < 1e-5);
        assert!(b.passes_gate);
        for (_, v) in b.components.labeled() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_negative_cosine_clamped() {
        let memory = MemoryRecordBuilder::new("p", "s")
            .content("x")
            .embedding(vec![-1.0, 0.0])
            .build()
            .unwrap();
        let q = Query::new("anything", vec![1.0, 0.0]);
        let signals = ScoringEngine::new().relevance_signals(&memory, &q);
        assert_eq!(signals.vector, 0.0);
    }

    #[test]
    fn test_question_match() {
        let q = Query::new("How should we cache embeddings?", vec![]);
        assert_eq!(question_match(&["how should we cache embeddings".into()], &q), 0.8);
        assert_eq!(question_match(&["how does retrieval work".into()], &q), 0.5);
        assert_eq!(question_match(&["why is it slow".into()], &q), 0.0);
    }

    #[test]
    fn test_temporal_and_action() {
        assert_eq!(temporal_score(TemporalRelevance::Persistent), 0.8);
        assert_eq!(temporal_score(TemporalRelevance::Session), 0.6);
        assert_eq!(temporal_score(TemporalRelevance::Temporary), 0.3);
        assert_eq!(temporal_score(TemporalRelevance::Unknown), 0.5);
    }

    #[test]
    fn test_context_alignment_baseline() {
        let q = Query::new("let's talk about lunch", vec![]);
        assert_eq!(context_alignment("technical_state", &q), 0.1);
        assert_eq!(context_alignment("whatever", &q), 0.1);
        let q = Query::new("fix the error in this function", vec![]);
        assert!((context_alignment("technical_state", &q) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_precheck_shares_signals() {
        let embedder = HashingEmbedder::new(384);
        let q = query(&embedder, QUERY);
        let engine = ScoringEngine::new();
        // Tag hit alone is not enough for the pre-check
        assert!(!engine.passes_precheck(&jwt_memory(&embedder), &q));

        let memory = MemoryRecordBuilder::new("p", "s")
            .content("Token refresh must retry once")
            .trigger_phrases(["jwt token refresh"])
            .semantic_tags(["jwt"])
            .build()
            .unwrap();
        let signals = engine.relevance_signals(&memory, &q);
        assert_eq!(signals.trigger, 1.0);
        assert!((signals.basic_relevance(&q) - 0.6).abs() < 1e-6);
        assert!(engine.passes_precheck(&memory, &q));
    }

    #[test]
    fn test_reasoning() {
        let components = ScoreComponents {
            trigger: 0.9,
            importance: 0.6,
            vector: 0.35,
            tag: 0.1,
            ..Default::default()
        };
        assert_eq!(
            generate_reasoning(&components),
            "Selected due to: Strong trigger phrase match (0.90), high importance (0.60), semantic similarity (0.35)"
        );
        assert_eq!(
            generate_reasoning(&ScoreComponents::default()),
            "Selected based on combined factors"
        );
    }
}
