//! Per-agent analysis and suggestion generation

use evo_core::{AgentRecord, ChangeEvent, ChangeType, Suggestion};
use serde_json::json;
use uuid::Uuid;

use crate::confidence::Score;

/// Capability-driven suggestions kept per response
pub const MAX_CAPABILITY_SUGGESTIONS: usize = 3;

/// Suggestion type implied by the change itself, if any
pub fn change_type_suggestion(change_type: &ChangeType) -> Option<(&'static str, &'static str)> {
    match change_type {
        ChangeType::TestRun => Some(("test-coverage", "Review test coverage around")),
        ChangeType::LintRun => Some(("lint-fix", "Resolve lint findings in")),
        ChangeType::BuildRun => Some(("build-optimization", "Look for build time savings around")),
        ChangeType::FileCreate => Some(("structure-review", "Check where the new file sits in")),
        _ => None,
    }
}

/// Structured finding for one agent and one event
pub fn analyze(agent: &AgentRecord, event: &ChangeEvent, score: &Score) -> serde_json::Value {
    json!({
        "role": agent.role,
        "changeType": event.change_type,
        "file": event.file_path,
        "extension": event.extension(),
        "pattern": score.pattern_key,
        "frequency": score.pattern.frequency,
        "recognized": score.recognized,
    })
}

/// Suggestions for one agent and one event.
///
/// One per capability (bounded), then one for the change type. Types are
/// unique within the list; priority is the agent's.
pub fn suggest(agent: &AgentRecord, event: &ChangeEvent) -> Vec<Suggestion> {
    let target = event.file_name().unwrap_or(&event.file_path);
    let mut suggestions: Vec<Suggestion> = Vec::new();

    for capability in agent.capabilities.iter().map(|c| c.trim()) {
        if suggestions.len() >= MAX_CAPABILITY_SUGGESTIONS {
            break;
        }
        if capability.is_empty() || suggestions.iter().any(|s| s.kind == capability) {
            continue;
        }
        suggestions.push(Suggestion {
            id: Uuid::new_v4().to_string(),
            kind: capability.to_string(),
            description: format!("Apply {} to {}", capability, target),
            priority: agent.priority,
        });
    }

    if let Some((kind, lead)) = change_type_suggestion(&event.change_type) {
        if !suggestions.iter().any(|s| s.kind == kind) {
            suggestions.push(Suggestion {
                id: Uuid::new_v4().to_string(),
                kind: kind.to_string(),
                description: format!("{} {}", lead, target),
                priority: agent.priority,
            });
        }
    }

    suggestions
}
