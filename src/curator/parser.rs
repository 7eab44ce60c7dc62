//! Agent output parsing
//!
//! Two layers:
//!
//! 1. `CliEnvelope` unwraps whatever JSON envelope the agent CLI printed and
//!    yields the assistant's text.
//! 2. `ResponseParser` recovers a structured value from that text, trying in
//!    order: strict JSON, Python-literal syntax, regex quote repair. The
//!    recovered value is then validated into a `CurationResult`.

use super::literal::parse_python_literal;
use super::types::{CandidateMemory, CurationResult, SnapshotFields};
use crate::error::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};

// =============================================================================
// CLI envelopes
// =============================================================================

/// Known shapes of agent CLI stdout, in matching priority order
#[derive(Debug, Clone, PartialEq)]
pub enum CliEnvelope {
    /// `[{"type":"assistant","message":{"content":[{"type":"text",...}]}}, ...]`
    /// and the older list shapes with a direct `content` array or `text` field
    MessageList(String),
    /// `{"response": "..."}`
    Response(String),
    /// `{"result": "..."}` or `{"result": {"content": [...]}}`
    Result(String),
    /// `{"content": [{"type":"text","text":"..."}]}`
    Content(String),
    /// Anything else: the stdout itself
    Raw(String),
}

impl CliEnvelope {
    /// Classify raw stdout
    pub fn parse(stdout: &str) -> Self {
        let trimmed = stdout.trim();
        let json: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => return Self::Raw(trimmed.to_string()),
        };

        match &json {
            Value::Array(items) => {
                if let Some(text) = items.iter().find_map(message_text) {
                    return Self::MessageList(text);
                }
            }
            Value::Object(obj) => {
                if let Some(response) = obj.get("response") {
                    return Self::Response(value_as_text(response));
                }
                if let Some(text) = obj.get("result").and_then(result_text) {
                    return Self::Result(text);
                }
                if let Some(text) = obj.get("content").and_then(first_text_block) {
                    return Self::Content(text);
                }
            }
            _ => {}
        }

        Self::Raw(trimmed.to_string())
    }

    /// The assistant text carried by the envelope
    pub fn into_text(self) -> String {
        match self {
            Self::MessageList(t)
            | Self::Response(t)
            | Self::Result(t)
            | Self::Content(t)
            | Self::Raw(t) => t,
        }
    }
}

fn message_text(message: &Value) -> Option<String> {
    let obj = message.as_object()?;
    if obj.get("type").and_then(Value::as_str) == Some("assistant") {
        if let Some(text) = obj
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(first_text_block)
        {
            return Some(text);
        }
    }
    if let Some(text) = obj.get("content").and_then(first_text_block) {
        return Some(text);
    }
    obj.get("text").map(value_as_text)
}

fn result_text(result: &Value) -> Option<String> {
    match result {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("content").and_then(first_text_block),
        _ => None,
    }
}

fn first_text_block(content: &Value) -> Option<String> {
    content.as_array()?.iter().find_map(|block| {
        if block.get("type").and_then(Value::as_str) == Some("text") {
            Some(block.get("text").map(value_as_text).unwrap_or_default())
        } else {
            None
        }
    })
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Response recovery
// =============================================================================

/// Recovers structured data from free-form agent text
pub struct ResponseParser {
    object_span: Regex,
    array_span: Regex,
    quote_fixes: Vec<(Regex, &'static str)>,
}

impl ResponseParser {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Internal(format!("invalid pattern '{}': {}", pattern, e)))
        };
        Ok(Self {
            object_span: compile(r"(?s)\{.*\}")?,
            array_span: compile(r"(?s)\[.*\]")?,
            quote_fixes: vec![
                (compile(r"'([^']*)'(\s*:)")?, "\"${1}\"${2}"),
                (compile(r":\s*'([^']*)'")?, ": \"${1}\""),
                (compile(r"\[\s*'")?, "[\""),
                (compile(r"'\s*\]")?, "\"]"),
                (compile(r"'\s*,\s*'")?, "\", \""),
            ],
        })
    }

    /// Candidate `{...}` and `[...]` spans of the text, earliest-starting first
    pub fn candidate_spans<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut spans: Vec<_> = [self.object_span.find(text), self.array_span.find(text)]
            .into_iter()
            .flatten()
            .collect();
        spans.sort_by_key(|m| m.start());
        spans.into_iter().map(|m| m.as_str()).collect()
    }

    /// Strict JSON, then Python literal, then regex quote repair
    pub fn parse_value(&self, text: &str) -> Result<Value> {
        let spans = self.candidate_spans(text);
        if spans.is_empty() {
            return Err(Error::MalformedAgentResponse(
                "no JSON object in response".to_string(),
            ));
        }

        let mut last_error = None;
        for span in spans {
            match self.parse_span(span) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::MalformedAgentResponse("empty response".to_string())))
    }

    fn parse_span(&self, span: &str) -> Result<Value> {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Ok(value);
        }

        match parse_python_literal(span) {
            Ok(value) => {
                tracing::debug!("Recovered agent response as a Python literal");
                return Ok(value);
            }
            Err(e) => tracing::debug!(error = %e, "Python literal parse failed"),
        }

        let repaired = self.repair_quotes(span);
        serde_json::from_str::<Value>(&repaired).map_err(|e| {
            Error::MalformedAgentResponse(format!("unparseable after quote repair: {}", e))
        })
    }

    /// Rewrite single-quoted keys, values and list items with double quotes
    pub fn repair_quotes(&self, text: &str) -> String {
        let mut repaired = text.to_string();
        for (pattern, replacement) in &self.quote_fixes {
            repaired = pattern.replace_all(&repaired, *replacement).into_owned();
        }
        repaired
    }

    /// Parse and validate a curation response
    pub fn parse_curation(&self, text: &str) -> Result<CurationResult> {
        let value = self.parse_value(text)?;
        Ok(curation_from_value(value))
    }
}

/// Build a `CurationResult` from a recovered value.
///
/// A top-level list is taken to be the memories array. Invalid candidates are
/// skipped with a warning; the rest are sorted by importance.
pub fn curation_from_value(value: Value) -> CurationResult {
    let (obj, memories) = match value {
        Value::Array(items) => (Map::new(), items),
        Value::Object(mut obj) => {
            let memories = match obj.remove("memories") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            (obj, memories)
        }
        _ => (Map::new(), Vec::new()),
    };

    let snapshot = obj
        .get("project_snapshot")
        .and_then(Value::as_object)
        .map(|s| SnapshotFields {
            current_phase: text_field(s, "current_phase"),
            recent_achievements: text_field(s, "recent_achievements"),
            active_challenges: text_field(s, "active_challenges"),
        })
        .unwrap_or_default();

    let mut candidates: Vec<CandidateMemory> = memories
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match candidate_from_value(item) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::warn!(index = i, error = %e, "Skipping invalid curated memory");
                None
            }
        })
        .collect();
    candidates.sort_by(|a, b| b.importance_weight.total_cmp(&a.importance_weight));

    CurationResult {
        session_summary: text_field(&obj, "session_summary"),
        interaction_tone: text_field(&obj, "interaction_tone"),
        project_snapshot: snapshot,
        memories: candidates,
    }
}

/// Validate one curated memory, filling defaults and clamping scores
pub fn candidate_from_value(value: &Value) -> Result<CandidateMemory> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::InvalidCandidate(format!("expected an object, got {}", value)))?;

    let content = text_field(obj, "content");
    if content.is_empty() {
        return Err(Error::InvalidCandidate("missing content".to_string()));
    }

    let context_type = text_field(obj, "context_type");
    let temporal = text_field(obj, "temporal_relevance");

    Ok(CandidateMemory {
        content,
        importance_weight: unit_field(obj, "importance_weight", 0.5),
        reasoning: text_field(obj, "reasoning"),
        context_type: if context_type.is_empty() {
            "general".to_string()
        } else {
            context_type
        },
        temporal_relevance: if temporal.is_empty() {
            "persistent".to_string()
        } else {
            temporal
        },
        knowledge_domain: text_field(obj, "knowledge_domain"),
        action_required: bool_field(obj, "action_required"),
        confidence_score: unit_field(obj, "confidence_score", 0.8),
        semantic_tags: list_field(obj, "semantic_tags"),
        trigger_phrases: list_field(obj, "trigger_phrases"),
        question_types: list_field(obj, "question_types"),
        emotional_resonance: text_field(obj, "emotional_resonance"),
        problem_solution_pair: bool_field(obj, "problem_solution_pair"),
    })
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn unit_field(obj: &Map<String, Value>, key: &str, default: f32) -> f32 {
    let raw = match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => (v as f32).clamp(0.0, 1.0),
        _ => default,
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn list_field(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(value_as_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
