//! Curation data types

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// What prompted a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationTrigger {
    #[default]
    SessionEnd,
    PreCompact,
    ContextFull,
}

impl CurationTrigger {
    /// Lenient parse used at the HTTP boundary: unknown triggers are session ends
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Self::SessionEnd)
    }

    /// Short human description used in curation prompts
    pub fn describe(&self) -> &'static str {
        match self {
            Self::SessionEnd => "the session is ending",
            Self::PreCompact => "the conversation is about to be compacted",
            Self::ContextFull => "the context window is nearly full",
        }
    }
}

impl std::str::FromStr for CurationTrigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "session_end" => Ok(Self::SessionEnd),
            "pre_compact" => Ok(Self::PreCompact),
            "context_full" => Ok(Self::ContextFull),
            other => Err(Error::InvalidCandidate(format!("unknown trigger '{}'", other))),
        }
    }
}

impl std::fmt::Display for CurationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionEnd => write!(f, "session_end"),
            Self::PreCompact => write!(f, "pre_compact"),
            Self::ContextFull => write!(f, "context_full"),
        }
    }
}

/// A validated memory proposed by the curator, not yet embedded or stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMemory {
    pub content: String,
    pub importance_weight: f32,
    pub reasoning: String,
    pub context_type: String,
    pub temporal_relevance: String,
    pub knowledge_domain: String,
    pub action_required: bool,
    pub confidence_score: f32,
    pub semantic_tags: Vec<String>,
    pub trigger_phrases: Vec<String>,
    pub question_types: Vec<String>,
    pub emotional_resonance: String,
    pub problem_solution_pair: bool,
}

/// Project status fields reported by the curator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFields {
    pub current_phase: String,
    pub recent_achievements: String,
    pub active_challenges: String,
}

impl SnapshotFields {
    pub fn is_empty(&self) -> bool {
        self.current_phase.trim().is_empty()
            && self.recent_achievements.trim().is_empty()
            && self.active_challenges.trim().is_empty()
    }
}

/// Everything a curation pass produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurationResult {
    pub session_summary: String,
    pub interaction_tone: String,
    pub project_snapshot: SnapshotFields,
    /// Sorted by importance, highest first
    pub memories: Vec<CandidateMemory>,
}

impl CurationResult {
    /// The empty shape returned whenever curation fails
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.session_summary.trim().is_empty()
            && self.interaction_tone.trim().is_empty()
            && self.project_snapshot.is_empty()
            && self.memories.is_empty()
    }
}
