//! Persisted memory data types
//!
//! A `MemoryRecord` is a curated fact extracted from a prior conversation,
//! annotated with the metadata the scoring engine ranks on. Records are
//! immutable once built; the builder clamps every score into `[0, 1]`.

use crate::curator::CurationTrigger;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A curated memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub project_id: String,
    /// Session the memory was curated from
    pub session_id: String,
    pub content: String,
    /// Why the curator considered this worth remembering
    pub reasoning: String,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
    pub metadata: MemoryMetadata,
}

/// Ranking metadata attached to every memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Always true for records produced by curation
    pub curated: bool,
    pub importance_weight: f32,
    pub confidence_score: f32,
    /// Free-form category, e.g. `technical_state` or `decision`
    pub context_type: String,
    pub temporal_relevance: TemporalRelevance,
    #[serde(default)]
    pub knowledge_domain: String,
    #[serde(default)]
    pub action_required: bool,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    #[serde(default)]
    pub question_types: Vec<String>,
    #[serde(default)]
    pub emotional_resonance: EmotionalResonance,
    #[serde(default)]
    pub problem_solution_pair: bool,
    /// Checkpoint that produced the record
    #[serde(default)]
    pub trigger: Option<CurationTrigger>,
    /// Which curation path produced the record (`session` or `transcript`)
    #[serde(default)]
    pub curator_version: String,
}

/// How long a memory stays relevant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalRelevance {
    #[default]
    Persistent,
    Session,
    Temporary,
    /// Anything the curator invented; scored neutrally
    #[serde(other)]
    Unknown,
}

impl TemporalRelevance {
    /// Parse a curator label, mapping anything unrecognized to `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "persistent" => Self::Persistent,
            "session" => Self::Session,
            "temporary" => Self::Temporary,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for TemporalRelevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::Session => write!(f, "session"),
            Self::Temporary => write!(f, "temporary"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Emotional tone a memory carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalResonance {
    Joy,
    Frustration,
    Discovery,
    Gratitude,
    #[default]
    #[serde(rename = "")]
    None,
}

impl EmotionalResonance {
    /// Parse a free-form curator label ("joy and discovery" → `Joy`)
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        [
            ("joy", Self::Joy),
            ("frustration", Self::Frustration),
            ("discovery", Self::Discovery),
            ("gratitude", Self::Gratitude),
        ]
        .into_iter()
        .filter_map(|(word, value)| lower.find(word).map(|pos| (pos, value)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, value)| value)
        .unwrap_or(Self::None)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Frustration => "frustration",
            Self::Discovery => "discovery",
            Self::Gratitude => "gratitude",
            Self::None => "",
        }
    }
}

/// Per-project bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Flips once a checkpoint for the project produced at least one memory
    pub first_session_completed: bool,
    pub total_sessions: u64,
    pub total_memories: u64,
}

impl ProjectRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_active: now,
            first_session_completed: false,
            total_sessions: 0,
            total_memories: 0,
        }
    }

    /// Human-friendly project name: the last path segment of the id
    pub fn display_name(&self) -> &str {
        self.id
            .trim_end_matches(is_path_separator)
            .rsplit(is_path_separator)
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Narrative summary of one session, written at checkpoint time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub project_id: String,
    pub summary: String,
    #[serde(default)]
    pub interaction_tone: String,
    pub created_at: DateTime<Utc>,
}

/// Project status at the end of a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub session_id: String,
    pub project_id: String,
    #[serde(default)]
    pub current_phase: String,
    #[serde(default)]
    pub recent_achievements: String,
    #[serde(default)]
    pub active_challenges: String,
    pub created_at: DateTime<Utc>,
}

impl ProjectSnapshot {
    /// True when no descriptive field carries content
    pub fn is_empty(&self) -> bool {
        self.current_phase.trim().is_empty()
            && self.recent_achievements.trim().is_empty()
            && self.active_challenges.trim().is_empty()
    }
}

/// Aggregate store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_projects: usize,
    pub total_sessions: u64,
    pub total_curated_memories: usize,
    pub projects: Vec<ProjectStats>,
}

/// Per-project statistics row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStats {
    pub id: String,
    pub total_sessions: u64,
    pub total_memories: u64,
    pub first_session_completed: bool,
    pub last_active: DateTime<Utc>,
}

/// Trim, drop empties and de-duplicate case-insensitively, keeping first-seen order
pub fn normalize_set<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

/// Builder for constructing `MemoryRecord` instances
pub struct MemoryRecordBuilder {
    project_id: String,
    session_id: String,
    content: Option<String>,
    reasoning: String,
    embedding: Vec<f32>,
    timestamp: Option<DateTime<Utc>>,
    importance: f32,
    confidence: f32,
    context_type: String,
    temporal_relevance: TemporalRelevance,
    knowledge_domain: String,
    action_required: bool,
    semantic_tags: Vec<String>,
    trigger_phrases: Vec<String>,
    question_types: Vec<String>,
    emotional_resonance: EmotionalResonance,
    problem_solution_pair: bool,
    trigger: Option<CurationTrigger>,
    curator_version: String,
}

impl MemoryRecordBuilder {
    /// Create a new builder for a memory owned by `project_id`
    pub fn new(project_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            session_id: session_id.into(),
            content: None,
            reasoning: String::new(),
            embedding: Vec::new(),
            timestamp: None,
            importance: 0.5,
            confidence: 0.8,
            context_type: "general".to_string(),
            temporal_relevance: TemporalRelevance::Persistent,
            knowledge_domain: String::new(),
            action_required: false,
            semantic_tags: Vec::new(),
            trigger_phrases: Vec::new(),
            question_types: Vec::new(),
            emotional_resonance: EmotionalResonance::None,
            problem_solution_pair: false,
            trigger: None,
            curator_version: "session".to_string(),
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Override the creation time (defaults to now)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the importance weight (clamped to 0.0–1.0)
    pub fn importance(mut self, score: f32) -> Self {
        self.importance = clamp_unit(score);
        self
    }

    /// Set the confidence score (clamped to 0.0–1.0)
    pub fn confidence(mut self, score: f32) -> Self {
        self.confidence = clamp_unit(score);
        self
    }

    pub fn context_type(mut self, context_type: impl Into<String>) -> Self {
        let value = context_type.into();
        if !value.trim().is_empty() {
            self.context_type = value.trim().to_string();
        }
        self
    }

    pub fn temporal_relevance(mut self, relevance: TemporalRelevance) -> Self {
        self.temporal_relevance = relevance;
        self
    }

    pub fn knowledge_domain(mut self, domain: impl Into<String>) -> Self {
        self.knowledge_domain = domain.into().trim().to_string();
        self
    }

    pub fn action_required(mut self, required: bool) -> Self {
        self.action_required = required;
        self
    }

    pub fn semantic_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.semantic_tags = normalize_set(tags);
        self
    }

    pub fn trigger_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.trigger_phrases = normalize_set(phrases);
        self
    }

    pub fn question_types<I, S>(mut self, questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.question_types = normalize_set(questions);
        self
    }

    pub fn emotional_resonance(mut self, emotion: EmotionalResonance) -> Self {
        self.emotional_resonance = emotion;
        self
    }

    pub fn problem_solution_pair(mut self, pair: bool) -> Self {
        self.problem_solution_pair = pair;
        self
    }

    pub fn trigger(mut self, trigger: CurationTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn curator_version(mut self, version: impl Into<String>) -> Self {
        self.curator_version = version.into();
        self
    }

    /// Build the record, returning an error if content is missing
    pub fn build(self) -> Result<MemoryRecord> {
        let content = self
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidCandidate("memory content is required".to_string()))?;
        if self.project_id.trim().is_empty() {
            return Err(Error::InvalidCandidate("project id is required".to_string()));
        }

        Ok(MemoryRecord {
            id: Uuid::new_v4(),
            project_id: self.project_id,
            session_id: self.session_id,
            content,
            reasoning: self.reasoning,
            embedding: self.embedding,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            metadata: MemoryMetadata {
                curated: true,
                importance_weight: self.importance,
                confidence_score: self.confidence,
                context_type: self.context_type,
                temporal_relevance: self.temporal_relevance,
                knowledge_domain: self.knowledge_domain,
                action_required: self.action_required,
                semantic_tags: self.semantic_tags,
                trigger_phrases: self.trigger_phrases,
                question_types: self.question_types,
                emotional_resonance: self.emotional_resonance,
                problem_solution_pair: self.problem_solution_pair,
                trigger: self.trigger,
                curator_version: self.curator_version,
            },
        })
    }
}

fn is_path_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn clamp_unit(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let record = MemoryRecordBuilder::new("proj", "s1")
            .content("Use tokio for async IO")
            .build()
            .unwrap();
        assert!(record.metadata.curated);
        assert_eq!(record.metadata.importance_weight, 0.5);
        assert_eq!(record.metadata.confidence_score, 0.8);
        assert_eq!(record.metadata.context_type, "general");
        assert_eq!(record.metadata.temporal_relevance, TemporalRelevance::Persistent);
        assert!(record.metadata.emotional_resonance.is_none());
    }

    #[test]
    fn test_builder_clamps_scores() {
        let record = MemoryRecordBuilder::new("proj", "s1")
            .content("x")
            .importance(1.7)
            .confidence(-0.2)
            .build()
            .unwrap();
        assert_eq!(record.metadata.importance_weight, 1.0);
        assert_eq!(record.metadata.confidence_score, 0.0);

        let nan = MemoryRecordBuilder::new("proj", "s1")
            .content("x")
            .importance(f32::NAN)
            .build()
            .unwrap();
        assert_eq!(nan.metadata.importance_weight, 0.0);
    }

    #[test]
    fn test_builder_requires_content() {
        let result = MemoryRecordBuilder::new("proj", "s1").content("   ").build();
        assert!(matches!(result, Err(Error::InvalidCandidate(_))));
        assert!(MemoryRecordBuilder::new("proj", "s1").build().is_err());
    }

    #[test]
    fn test_tag_sets_are_deduplicated() {
        let record = MemoryRecordBuilder::new("proj", "s1")
            .content("x")
            .semantic_tags(["JWT", "jwt", " auth ", ""])
            .build()
            .unwrap();
        assert_eq!(record.metadata.semantic_tags, vec!["JWT", "auth"]);
    }

    #[test]
    fn test_emotion_from_label() {
        assert_eq!(EmotionalResonance::from_label("Joy"), EmotionalResonance::Joy);
        assert_eq!(
            EmotionalResonance::from_label("discovery mixed with joy"),
            EmotionalResonance::Discovery
        );
        assert_eq!(EmotionalResonance::from_label("neutral"), EmotionalResonance::None);
    }

    #[test]
    fn test_temporal_serde_unknown() {
        let parsed: TemporalRelevance = serde_json::from_str("\"forever\"").unwrap();
        assert_eq!(parsed, TemporalRelevance::Unknown);
        assert_eq!(TemporalRelevance::from_label("Session"), TemporalRelevance::Session);
    }

    #[test]
    fn test_emotion_none_serializes_empty() {
        let json = serde_json::to_string(&EmotionalResonance::None).unwrap();
        assert_eq!(json, "\"\"");
        let back: EmotionalResonance = serde_json::from_str("\"\"").unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_project_display_name() {
        assert_eq!(ProjectRecord::new("/home/u/code/memoria").display_name(), "memoria");
        assert_eq!(ProjectRecord::new("memoria/").display_name(), "memoria");
        assert_eq!(ProjectRecord::new("plain").display_name(), "plain");
    }

    #[test]
    fn test_snapshot_emptiness() {
        let mut snapshot = ProjectSnapshot {
            session_id: "s".into(),
            project_id: "p".into(),
            created_at: Utc::now(),
            ..Default::default()
        };
        assert!(snapshot.is_empty());
        snapshot.active_challenges = "flaky CI".into();
        assert!(!snapshot.is_empty());
    }
}
