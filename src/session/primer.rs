//! Session primer
//!
//! The first context of a returning session: what happened last time, where
//! the project stands, and a few memories that describe the project itself.
//! Built from stored records only; no scoring and no agent call.

use crate::config::PrimerConfig;
use crate::memory::{MemoryRecord, ProjectRecord, ProjectSnapshot, SessionSummary};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use uuid::Uuid;

/// Shorter project names match too much content to be a useful marker
const MIN_NAME_MARKER: usize = 3;

/// A rendered primer and the memories it surfaced
#[derive(Debug, Clone, Default)]
pub struct Primer {
    pub text: String,
    pub essential_ids: Vec<Uuid>,
}

/// Everything the primer is built from
pub struct PrimerInput<'a> {
    pub project: &'a ProjectRecord,
    pub summary: Option<&'a SessionSummary>,
    pub snapshot: Option<&'a ProjectSnapshot>,
    pub memories: &'a [MemoryRecord],
    pub now: DateTime<Utc>,
}

pub fn build_primer(input: PrimerInput<'_>, config: &PrimerConfig) -> Primer {
    let mut text = String::from("# Continuing Session\n");

    if let Some(summary) = input.summary {
        let _ = write!(
            text,
            "\n*Last session: {}*\n\n{}\n",
            time_ago(summary.created_at, input.now),
            summary.summary.trim()
        );
        if !summary.interaction_tone.trim().is_empty() {
            let _ = writeln!(text, "\n**Interaction tone:** {}", summary.interaction_tone.trim());
        }
    }

    if let Some(snapshot) = input.snapshot.filter(|s| !s.is_empty()) {
        text.push_str("\n## Project Status\n");
        for (label, value) in [
            ("Phase", &snapshot.current_phase),
            ("Recent achievements", &snapshot.recent_achievements),
            ("Active challenges", &snapshot.active_challenges),
        ] {
            if !value.trim().is_empty() {
                let _ = writeln!(text, "- **{}:** {}", label, value.trim());
            }
        }
    }

    let essential = essential_memories(input.project, input.memories, config);
    if !essential.is_empty() {
        text.push_str("\n## Essential Context\n");
        for memory in &essential {
            let _ = writeln!(text, "- {}", memory.content.trim());
        }
    }

    let _ = write!(
        text,
        "\n*Memory system active: {} curated memories available for {}.*\n",
        input.memories.len(),
        input.project.display_name()
    );

    Primer {
        text,
        essential_ids: essential.iter().map(|m| m.id).collect(),
    }
}

/// Memories that describe the project: their content names the project or a
/// configured marker. Most important first.
fn essential_memories<'a>(
    project: &ProjectRecord,
    memories: &'a [MemoryRecord],
    config: &PrimerConfig,
) -> Vec<&'a MemoryRecord> {
    let mut markers: Vec<String> = config
        .essential_markers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect();
    let name = project.display_name().to_lowercase();
    if name.chars().count() >= MIN_NAME_MARKER {
        markers.push(name);
    }

    let mut essential: Vec<&MemoryRecord> = memories
        .iter()
        .filter(|m| {
            let content = m.content.to_lowercase();
            markers.iter().any(|marker| content.contains(marker.as_str()))
        })
        .collect();
    essential.sort_by(|a, b| {
        b.metadata
            .importance_weight
            .total_cmp(&a.metadata.importance_weight)
    });
    essential.truncate(config.max_essential);
    essential
}

/// Coarse relative time, e.g. "3 hours ago"
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes().max(0);
    let (value, unit) = match minutes {
        0 => return "just now".to_string(),
        m if m < 60 => (m, "minute"),
        m if m < 60 * 24 => (m / 60, "hour"),
        m => (m / (60 * 24), "day"),
    };
    format!("{} {}{} ago", value, unit, if value == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordBuilder;
    use chrono::Duration;

    fn memory(content: &str, importance: f32) -> MemoryRecord {
        MemoryRecordBuilder::new("/home/dev/memoria", "s0")
            .content(content)
            .importance(importance)
            .build()
            .unwrap()
    }

    #[test]
    fn test_time_ago() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "just now");
        assert_eq!(time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(time_ago(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(time_ago(now - Duration::days(2), now), "2 days ago");
        assert_eq!(time_ago(now + Duration::hours(1), now), "just now");
    }

    #[test]
    fn test_full_primer() {
        let now = Utc::now();
        let project = ProjectRecord::new("/home/dev/memoria");
        let summary = SessionSummary {
            session_id: "s0".into(),
            project_id: project.id.clone(),
            summary: "Wired up the retrieval engine.".into(),
            interaction_tone: "collaborative".into(),
            created_at: now - Duration::hours(2),
        };
        let snapshot = ProjectSnapshot {
            current_phase: "integration".into(),
            active_challenges: "flaky agent CLI".into(),
            ..Default::default()
        };
        let memories = vec![
            memory("Memoria is a memory engine for coding agents", 0.7),
            memory("Use tabs", 0.9),
            memory("memoria stores JSON files under ~/.memoria", 0.95),
        ];

        let primer = build_primer(
            PrimerInput {
                project: &project,
                summary: Some(&summary),
                snapshot: Some(&snapshot),
                memories: &memories,
                now,
            },
            &PrimerConfig::default(),
        );

        assert!(primer.text.starts_with("# Continuing Session"));
        assert!(primer.text.contains("*Last session: 2 hours ago*"));
        assert!(primer.text.contains("Wired up the retrieval engine."));
        assert!(primer.text.contains("**Interaction tone:** collaborative"));
        assert!(primer.text.contains("- **Phase:** integration"));
        assert!(!primer.text.contains("Recent achievements"));
        assert!(primer.text.contains("3 curated memories available for memoria"));

        // Only memories naming the project, most important first
        assert_eq!(primer.essential_ids, vec![memories[2].id, memories[0].id]);
        assert!(!primer.text.contains("Use tabs"));
    }

    #[test]
    fn test_markers_and_cap() {
        let project = ProjectRecord::new("p");
        let memories: Vec<MemoryRecord> =
            (0..5).map(|i| memory(&format!("ARCHITECTURE note {}", i), 0.5)).collect();
        let config = PrimerConfig {
            essential_markers: vec!["architecture".into()],
            max_essential: 2,
        };
        let primer = build_primer(
            PrimerInput {
                project: &project,
                summary: None,
                snapshot: None,
                memories: &memories,
                now: Utc::now(),
            },
            &config,
        );
        assert_eq!(primer.essential_ids.len(), 2);
        assert!(!primer.text.contains("Last session"));
    }
}
