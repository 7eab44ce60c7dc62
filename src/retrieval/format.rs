//! Rendering selected memories as an injectable block

use super::strategy::SelectedMemory;
use std::fmt::Write;

const MAX_TAGS: usize = 3;

/// Format selected memories; empty input renders as the empty string
pub fn format_context(selected: &[SelectedMemory]) -> String {
    if selected.is_empty() {
        return String::new();
    }

    let mut out = String::from("# Memory Context\n\n## Key Memories\n");
    for memory in selected {
        let meta = &memory.record.metadata;
        out.push_str("- ");
        if let Some(marker) = memory.tier.marker() {
            out.push_str(marker);
            out.push(' ');
        }
        if meta.action_required {
            out.push_str("[ACTION] ");
        }
        let _ = write!(
            out,
            "[{} • {:.1}] ",
            meta.context_type.to_uppercase(),
            meta.importance_weight
        );
        if !meta.semantic_tags.is_empty() {
            let tags: Vec<&str> = meta
                .semantic_tags
                .iter()
                .take(MAX_TAGS)
                .map(String::as_str)
                .collect();
            let _ = write!(out, "[{}] ", tags.join(", "));
        }
        out.push_str(memory.record.content.trim());
        out.push('\n');
    }
    out
}
