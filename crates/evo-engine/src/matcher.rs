//! Trigger matching
//!
//! A trigger is either a glob (`*.ts`, `src/**/*.rs`, `Dockerfile*`) checked
//! against the event's file name and path, a dotted extension (`.py`), or a
//! keyword checked against the change type (`file-modify`, `test`).
//! Plain names such as `package.json` are globs without wildcards: they match
//! the file name or path literally, and otherwise still count as keywords.
//! An agent matches when any one of its triggers does.

use evo_core::{AgentRecord, ChangeEvent};
use tracing::debug;

fn is_glob(trigger: &str) -> bool {
    trigger.contains(['*', '?', '['])
}

/// Whether a single trigger matches the event
pub fn trigger_matches(trigger: &str, event: &ChangeEvent) -> bool {
    let trigger = trigger.trim();
    if trigger.is_empty() {
        return false;
    }

    match glob::Pattern::new(trigger) {
        Ok(pattern) => {
            let by_name = event.file_name().is_some_and(|name| pattern.matches(name));
            if by_name || pattern.matches(&event.file_path) {
                return true;
            }
            if is_glob(trigger) {
                return false;
            }
        }
        Err(e) => {
            // Fall through and treat it as a keyword
            debug!("Invalid glob trigger '{}': {}", trigger, e);
        }
    }

    if let Some(ext) = trigger.strip_prefix('.') {
        return event
            .extension()
            .is_some_and(|actual| actual.eq_ignore_ascii_case(ext));
    }

    let keyword = trigger.to_lowercase();
    let change_type = event.change_type.as_str().to_lowercase();
    change_type == keyword || change_type.contains(&keyword)
}

/// Whether any of the agent's triggers matches
pub fn agent_matches(agent: &AgentRecord, event: &ChangeEvent) -> bool {
    agent.triggers.iter().any(|t| trigger_matches(t, event))
}

/// Select the eligible agents relevant to an event, preserving input order
pub fn match_agents(agents: Vec<AgentRecord>, event: &ChangeEvent) -> Vec<AgentRecord> {
    let matched: Vec<AgentRecord> = agents
        .into_iter()
        .filter(|agent| agent.application_id == event.application_id)
        .filter(|agent| agent.status.is_eligible())
        .filter(|agent| agent_matches(agent, event))
        .collect();

    debug!(
        "{} agent(s) matched {} on {}",
        matched.len(),
        event.change_type,
        event.file_path
    );
    matched
}
