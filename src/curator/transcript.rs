//! JSONL transcript reader
//!
//! Agent CLIs persist each session as one JSON object per line. Only the
//! conversational entries matter for curation; bookkeeping entries, meta
//! messages and slash-command echoes are dropped.

use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;

const SKIP_TYPES: &[&str] = &["file-history-snapshot", "queue-operation"];
const COMMAND_MARKERS: &[&str] = &["<command-name>", "<local-command-stdout>"];
const TOOL_RESULT_PREVIEW: usize = 300;

/// Speaker of a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// Compaction summary written by the CLI
    Summary,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Self::User => "[USER]",
            Self::Assistant => "[ASSISTANT]",
            Self::Summary => "[CONTEXT SUMMARY]",
        }
    }
}

/// One conversational turn, flattened to text
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptTurn {
    pub role: Role,
    pub text: String,
}

/// Read and parse a transcript file
pub async fn read_transcript(path: &Path) -> Result<Vec<TranscriptTurn>> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("transcript {}: {}", path.display(), e),
        ))
    })?;
    let turns = parse_transcript(&raw);
    tracing::info!(path = %path.display(), turns = turns.len(), "Parsed transcript");
    Ok(turns)
}

/// Parse JSONL content; malformed lines are skipped
pub fn parse_transcript(raw: &str) -> Vec<TranscriptTurn> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str::<Value>(line) {
            Ok(entry) => turn_from_entry(&entry),
            Err(e) => {
                tracing::warn!(line = i + 1, error = %e, "Skipping malformed transcript line");
                None
            }
        })
        .collect()
}

fn turn_from_entry(entry: &Value) -> Option<TranscriptTurn> {
    let kind = entry.get("type").and_then(Value::as_str).unwrap_or_default();
    if SKIP_TYPES.contains(&kind) {
        return None;
    }
    if kind == "summary" {
        let text = entry.get("summary").and_then(Value::as_str)?.trim();
        return (!text.is_empty()).then(|| TranscriptTurn {
            role: Role::Summary,
            text: text.to_string(),
        });
    }
    if kind != "user" && kind != "assistant" {
        return None;
    }
    if entry.get("isMeta").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let message = entry.get("message")?;
    let role = match message.get("role").and_then(Value::as_str)? {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => return None,
    };
    let content = message.get("content")?;

    if let Some(text) = content.as_str() {
        if role == Role::User && COMMAND_MARKERS.iter().any(|m| text.contains(m)) {
            return None;
        }
    }

    let text = flatten_content(content);
    (!text.trim().is_empty()).then_some(TranscriptTurn { role, text })
}

fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.trim().to_string(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(flatten_block)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn flatten_block(block: &Value) -> Option<String> {
    match block.get("type").and_then(Value::as_str)? {
        "text" => block
            .get("text")
            .and_then(Value::as_str)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        "tool_use" => {
            let name = block.get("name").and_then(Value::as_str).unwrap_or("unknown");
            Some(format!("[Used tool: {}]", name))
        }
        "tool_result" => {
            let text = match block.get("content") {
                Some(Value::String(s)) => s.clone(),
                Some(other @ Value::Array(_)) => flatten_content(other),
                _ => return None,
            };
            let text = text.trim();
            (!text.is_empty()).then(|| format!("[Tool result: {}]", truncate(text, TOOL_RESULT_PREVIEW)))
        }
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Render turns as the plain-text conversation embedded in curation prompts
pub fn format_conversation(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}\n{}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
