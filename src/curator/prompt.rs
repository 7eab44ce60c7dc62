//! Prompts sent to the external agent
//!
//! The wording is free to evolve; the JSON shapes requested here are the
//! contract the parser relies on.

use super::types::CurationTrigger;
use crate::memory::MemoryRecord;
use std::fmt::Write;

/// Output schema every curation prompt asks for
pub const CURATION_SCHEMA: &str = r#"{
  "session_summary": "2-3 sentences describing what happened in the session",
  "interaction_tone": "tone of the collaboration, or empty if neutral",
  "project_snapshot": {
    "current_phase": "where the project stands",
    "recent_achievements": "what was accomplished",
    "active_challenges": "what remains open"
  },
  "memories": [
    {
      "content": "one self-contained fact, decision or insight",
      "importance_weight": 0.8,
      "semantic_tags": ["concepts", "this", "relates", "to"],
      "reasoning": "why a future session needs this",
      "context_type": "technical_state | breakthrough | project_context | personal | unresolved | decision",
      "temporal_relevance": "persistent | session | temporary",
      "knowledge_domain": "area this belongs to",
      "action_required": false,
      "confidence_score": 0.9,
      "trigger_phrases": ["situations in which this memory helps"],
      "question_types": ["questions this memory answers"],
      "emotional_resonance": "joy | frustration | discovery | gratitude | empty",
      "problem_solution_pair": false
    }
  ]
}"#;

const CURATION_GUIDELINES: &str = "\
You curate long-term memories for an assistant that loses its context between sessions.
Extract only what a future session genuinely needs: technical decisions and their reasons,
problems together with the fixes that worked, user preferences, unfinished work, project
state, and moments that shaped the collaboration. Each memory must stand on its own.

Scoring notes for the fields you fill in:
- trigger_phrases describe WHEN the memory is relevant (\"when debugging authentication\"),
  not exact text to match.
- semantic_tags name the concepts involved; keep them short.
- importance_weight above 0.9, or action_required = true, forces the memory into the
  next relevant session. Use both sparingly.
- Prefer fewer, denser memories over many thin ones.";

/// System prompt for curating a resumed agent session
pub fn session_system_prompt(trigger: CurationTrigger) -> String {
    format!(
        "{}\n\nCuration was triggered because {}.\n\nReturn ONLY this JSON structure, with double quotes and no trailing commas:\n{}",
        CURATION_GUIDELINES,
        trigger.describe(),
        CURATION_SCHEMA
    )
}

/// User message sent into the resumed session
pub fn session_user_message(trigger: CurationTrigger) -> String {
    format!(
        "Checkpoint ({}): review our conversation so far and return the memory curation JSON now.",
        trigger
    )
}

/// System prompt for curating a transcript the agent has not seen
pub fn transcript_system_prompt() -> String {
    format!(
        "{}\n\nYou are given a transcript of a past session rather than the session itself.\n\nReturn ONLY this JSON structure, with double quotes and no trailing commas:\n{}",
        CURATION_GUIDELINES, CURATION_SCHEMA
    )
}

/// User message wrapping a formatted transcript
pub fn transcript_user_message(transcript: &str, trigger: CurationTrigger) -> String {
    format!(
        "Checkpoint ({}). Curate memories from this transcript:\n\n<transcript>\n{}\n</transcript>",
        trigger, transcript
    )
}

/// System prompt for agent-assisted retrieval
pub const SELECTION_SYSTEM_PROMPT: &str = "\
You select which stored memories are worth showing to an assistant before it answers a
message. Pick only memories that would change or improve the answer. Return ONLY JSON of
the form {\"selected\": [indices], \"reasoning\": \"one sentence\"}.";

/// Numbered candidate list plus the incoming message
pub fn selection_user_message(query: &str, candidates: &[MemoryRecord], limit: usize) -> String {
    let mut out = format!(
        "Incoming message:\n{}\n\nChoose at most {} of these memories:\n",
        query, limit
    );
    for (i, memory) in candidates.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] ({}, importance {:.2}) {}{}",
            i,
            memory.metadata.context_type,
            memory.metadata.importance_weight,
            memory.content,
            if memory.metadata.semantic_tags.is_empty() {
                String::new()
            } else {
                format!(" [tags: {}]", memory.metadata.semantic_tags.join(", "))
            }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordBuilder;

    #[test]
    fn test_session_prompt_carries_schema_and_trigger() {
        let prompt = session_system_prompt(CurationTrigger::PreCompact);
        assert!(prompt.contains("\"memories\""));
        assert!(prompt.contains("about to be compacted"));
        assert!(session_user_message(CurationTrigger::PreCompact).contains("pre_compact"));
    }

    #[test]
    fn test_schema_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(CURATION_SCHEMA).unwrap();
        assert!(value["memories"].is_array());
    }

    #[test]
    fn test_selection_message_numbers_candidates() {
        let memories = vec![
            MemoryRecordBuilder::new("p", "s")
                .content("first")
                .semantic_tags(["a"])
                .build()
                .unwrap(),
            MemoryRecordBuilder::new("p", "s").content("second").build().unwrap(),
        ];
        let message = selection_user_message("why is it slow?", &memories, 1);
        assert!(message.contains("[0] (general, importance 0.50) first [tags: a]"));
        assert!(message.contains("[1] (general, importance 0.50) second"));
        assert!(message.contains("at most 1"));
    }
}
