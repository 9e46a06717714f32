//! Cross-referencing responses to the same event

use std::collections::{BTreeMap, BTreeSet};

use evo_core::{AgentResponse, Coordination};

/// Annotate responses that share an event.
///
/// With two or more responses each one lists the other agents and the
/// suggestion types proposed by at least two agents. A single response
/// carries no coordination at all.
pub fn coordinate(mut responses: Vec<AgentResponse>) -> Vec<AgentResponse> {
    if responses.len() < 2 {
        for response in &mut responses {
            response.coordination = None;
        }
        return responses;
    }

    let mut proposers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for response in &responses {
        for suggestion in &response.suggestions {
            proposers
                .entry(suggestion.kind.as_str())
                .or_default()
                .insert(response.agent_id.as_str());
        }
    }

    let shared_findings: Vec<String> = proposers
        .into_iter()
        .filter(|(_, agents)| agents.len() >= 2)
        .map(|(kind, _)| kind.to_string())
        .collect();

    let ids: Vec<String> = responses.iter().map(|r| r.agent_id.clone()).collect();

    for response in &mut responses {
        let related_agents = ids
            .iter()
            .filter(|id| **id != response.agent_id)
            .cloned()
            .collect();
        response.coordination = Some(Coordination {
            related_agents,
            shared_findings: shared_findings.clone(),
        });
    }

    responses
}

#[cfg(test)]
mod tests {
    use super::*;
    use evo_core::{AgentPriority, Suggestion};

    fn response(agent_id: &str, kinds: &[&str]) -> AgentResponse {
        AgentResponse {
            agent_id: agent_id.to_string(),
            agent_name: agent_id.to_string(),
            analysis: serde_json::json!({}),
            suggestions: kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| Suggestion {
                    id: format!("{}-{}", agent_id, i),
                    kind: kind.to_string(),
                    description: String::new(),
                    priority: AgentPriority::Important,
                })
                .collect(),
            confidence: 0.5,
            pattern_key: "file-modify_ts".to_string(),
            coordination: None,
        }
    }

    #[test]
    fn test_solo_response_has_no_coordination() {
        let out = coordinate(vec![response("a", &["refactoring"])]);
        assert!(out[0].coordination.is_none());
        assert!(coordinate(Vec::new()).is_empty());
    }

    #[test]
    fn test_pair_references_each_other() {
        let out = coordinate(vec![
            response("a", &["refactoring", "naming"]),
            response("b", &["refactoring", "security-audit"]),
        ]);

        let a = out[0].coordination.as_ref().unwrap();
        let b = out[1].coordination.as_ref().unwrap();
        assert_eq!(a.related_agents, vec!["b"]);
        assert_eq!(b.related_agents, vec!["a"]);
        assert_eq!(a.shared_findings, vec!["refactoring"]);
        assert_eq!(b.shared_findings, vec!["refactoring"]);
    }

    #[test]
    fn test_repeat_within_one_agent_is_not_shared() {
        let out = coordinate(vec![
            response("a", &["naming", "naming"]),
            response("b", &["docs"]),
            response("c", &[]),
        ]);
        let coordination = out[2].coordination.as_ref().unwrap();
        assert_eq!(coordination.related_agents, vec!["a", "b"]);
        assert!(coordination.shared_findings.is_empty());
    }
}
