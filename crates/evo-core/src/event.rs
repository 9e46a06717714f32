//! Change events and everything the engine derives from them: agent
//! responses, suggestions, evolutions and applied outcomes.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use crate::types::AgentPriority;
use crate::{EvoError, Result};

/// Kind of change observed in the editing session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeType {
    FileCreate,
    FileModify,
    TestRun,
    BuildRun,
    LintRun,
    CommandRun,
    /// Any other change type supplied by the relay, kept verbatim
    Other(String),
}

fn test_command() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(test|tests|jest|vitest|mocha|pytest|rspec|nextest)\b")
            .expect("static regex")
    })
}

fn build_command() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(build|compile|tsc|webpack|vite|make|gradle|mvn)\b")
            .expect("static regex")
    })
}

fn lint_command() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(lint|eslint|clippy|ruff|flake8|pylint|prettier|fmt|rubocop)\b")
            .expect("static regex")
    })
}

impl ChangeType {
    /// Infer a change type from the editing tool and, for shell tools, the command.
    ///
    /// Test runners win over build tools, which win over linters.
    pub fn infer(tool: &str, command: Option<&str>) -> Self {
        let inferred = match tool.to_lowercase().as_str() {
            "write" | "create" | "notebookcreate" => Self::FileCreate,
            "edit" | "multiedit" | "notebookedit" | "str_replace" => Self::FileModify,
            "bash" | "shell" | "terminal" => match command {
                Some(cmd) if test_command().is_match(cmd) => Self::TestRun,
                Some(cmd) if build_command().is_match(cmd) => Self::BuildRun,
                Some(cmd) if lint_command().is_match(cmd) => Self::LintRun,
                _ => Self::CommandRun,
            },
            _ => Self::CommandRun,
        };
        debug!("Inferred change type {} from tool {}", inferred, tool);
        inferred
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::FileCreate => "file-create",
            Self::FileModify => "file-modify",
            Self::TestRun => "test-run",
            Self::BuildRun => "build-run",
            Self::LintRun => "lint-run",
            Self::CommandRun => "command-run",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for ChangeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "file-create" => Self::FileCreate,
            "file-modify" => Self::FileModify,
            "test-run" => Self::TestRun,
            "build-run" => Self::BuildRun,
            "lint-run" => Self::LintRun,
            "command-run" => Self::CommandRun,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ChangeType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ChangeType> for String {
    fn from(change_type: ChangeType) -> Self {
        change_type.as_str().to_string()
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, immutable change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Caller-supplied idempotency key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub application_id: String,
    pub file_path: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    /// Opaque pass-through data from the relay
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ChangeEvent {
    pub fn new(
        application_id: impl Into<String>,
        file_path: impl Into<String>,
        change_type: ChangeType,
    ) -> Self {
        Self {
            event_id: None,
            application_id: application_id.into(),
            file_path: file_path.into(),
            change_type,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// File extension without the dot, if any
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_path)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
    }

    /// Final path component
    pub fn file_name(&self) -> Option<&str> {
        Path::new(&self.file_path).file_name().and_then(|n| n.to_str())
    }
}

/// Change event as it arrives from the relay, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEventRequest {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub change_type: Option<String>,
    /// Editing tool name, used when `change_type` is absent
    #[serde(default)]
    pub tool: Option<String>,
    /// Shell command, used with `tool` when `change_type` is absent
    #[serde(default)]
    pub command: Option<String>,
    /// RFC 3339; unparseable values fall back to the receive time
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ChangeEventRequest {
    /// Validate required fields and produce an immutable event
    pub fn into_event(self) -> Result<ChangeEvent> {
        let application_id = self
            .application_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EvoError::validation("change event is missing applicationId"))?;

        let file_path = self
            .file_path
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EvoError::validation("change event is missing filePath"))?;

        let change_type = match self.change_type.filter(|c| !c.trim().is_empty()) {
            Some(explicit) => ChangeType::from(explicit.trim().to_lowercase()),
            None => match self.tool.as_deref() {
                Some(tool) => ChangeType::infer(tool, self.command.as_deref()),
                None => ChangeType::FileModify,
            },
        };

        let timestamp = match self.timestamp.as_deref() {
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    debug!("Ignoring unparseable timestamp '{}': {}", raw, e);
                    Utc::now()
                }
            },
            None => Utc::now(),
        };

        Ok(ChangeEvent {
            event_id: self.event_id.filter(|id| !id.trim().is_empty()),
            application_id,
            file_path,
            change_type,
            timestamp,
            metadata: self.metadata.unwrap_or(serde_json::Value::Null),
        })
    }
}

/// Improvement proposed by one agent for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub priority: AgentPriority,
}

/// Cross-references attached when several agents answered the same event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordination {
    pub related_agents: Vec<String>,
    pub shared_findings: Vec<String>,
}

/// One agent's answer to one change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub agent_id: String,
    pub agent_name: String,
    pub analysis: serde_json::Value,
    pub suggestions: Vec<Suggestion>,
    pub confidence: f64,
    pub pattern_key: String,
    /// Absent for solo responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordination: Option<Coordination>,
}

/// A tracked change event together with the responses it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evolution {
    pub id: String,
    pub event: ChangeEvent,
    pub responses: Vec<AgentResponse>,
    pub recorded_at: DateTime<Utc>,
}

/// Durable ledger copy of a suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRecord {
    pub id: String,
    pub evolution_id: String,
    pub application_id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub priority: AgentPriority,
    pub confidence: f64,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl SuggestionRecord {
    pub fn from_response(
        evolution_id: &str,
        event: &ChangeEvent,
        response: &AgentResponse,
        suggestion: &Suggestion,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: suggestion.id.clone(),
            evolution_id: evolution_id.to_string(),
            application_id: event.application_id.clone(),
            agent_id: response.agent_id.clone(),
            kind: suggestion.kind.clone(),
            description: suggestion.description.clone(),
            priority: suggestion.priority,
            confidence: response.confidence,
            file_path: event.file_path.clone(),
            created_at: now,
            applied_at: None,
        }
    }
}

/// Result of applying a suggestion, reported by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    /// Improvement types actually applied
    #[serde(default)]
    pub applied_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Apply request from the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    #[serde(default)]
    pub suggestion_id: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub outcome: Outcome,
}

/// What `apply` did with an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApplyResult {
    /// Outcome recorded and fed back to the agent
    #[serde(rename_all = "camelCase")]
    Recorded {
        agent_id: String,
        suggestions_accepted: u64,
        success_rate: f64,
    },
    /// Outcome recorded but the originating agent no longer exists
    AgentGone,
    /// Suggestion already had an outcome; nothing changed
    AlreadyApplied,
    /// No such suggestion for this application; tolerated
    UnknownSuggestion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_from_tool() {
        assert_eq!(ChangeType::infer("Write", None), ChangeType::FileCreate);
        assert_eq!(ChangeType::infer("Edit", None), ChangeType::FileModify);
        assert_eq!(ChangeType::infer("MultiEdit", None), ChangeType::FileModify);
    }

    #[test]
    fn test_infer_from_command() {
        assert_eq!(
            ChangeType::infer("Bash", Some("npm test -- --watch")),
            ChangeType::TestRun
        );
        assert_eq!(
            ChangeType::infer("Bash", Some("cargo build --release")),
            ChangeType::BuildRun
        );
        assert_eq!(
            ChangeType::infer("Bash", Some("npx eslint src")),
            ChangeType::LintRun
        );
        assert_eq!(ChangeType::infer("Bash", Some("ls -la")), ChangeType::CommandRun);
        assert_eq!(ChangeType::infer("Bash", None), ChangeType::CommandRun);
    }

    #[test]
    fn test_change_type_round_trip_other() {
        let ct: ChangeType = serde_json::from_str("\"deploy-run\"").unwrap();
        assert_eq!(ct, ChangeType::Other("deploy-run".to_string()));
        assert_eq!(serde_json::to_string(&ct).unwrap(), "\"deploy-run\"");
        assert_eq!(ChangeType::from("file-modify"), ChangeType::FileModify);
    }

    #[test]
    fn test_request_requires_application_id() {
        let req = ChangeEventRequest {
            file_path: Some("/x.ts".to_string()),
            ..Default::default()
        };
        let err = req.into_event().unwrap_err();
        assert!(matches!(err, EvoError::Validation(ref m) if m.contains("applicationId")));
    }

    #[test]
    fn test_request_requires_file_path() {
        let req = ChangeEventRequest {
            application_id: Some("app-1".to_string()),
            file_path: Some("   ".to_string()),
            ..Default::default()
        };
        let err = req.into_event().unwrap_err();
        assert!(matches!(err, EvoError::Validation(ref m) if m.contains("filePath")));
    }

    #[test]
    fn test_request_tolerates_odd_metadata_and_timestamp() {
        let json = r#"{
            "applicationId": "app-1",
            "filePath": "/src/a.py",
            "tool": "Bash",
            "command": "pytest -q",
            "timestamp": "yesterday-ish",
            "metadata": [1, {"nested": true}, "x"]
        }"#;
        let req: ChangeEventRequest = serde_json::from_str(json).unwrap();
        let event = req.into_event().unwrap();
        assert_eq!(event.change_type, ChangeType::TestRun);
        assert!(event.metadata.is_array());
        assert_eq!(event.extension(), Some("py"));
        assert_eq!(event.file_name(), Some("a.py"));
    }

    #[test]
    fn test_solo_response_omits_coordination() {
        let response = AgentResponse {
            agent_id: "agent-1".to_string(),
            agent_name: "Quality".to_string(),
            analysis: serde_json::json!({}),
            suggestions: vec![],
            confidence: 0.5,
            pattern_key: "file-modify_ts".to_string(),
            coordination: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("coordination").is_none());
    }

    #[test]
    fn test_apply_result_tagging() {
        let json = serde_json::to_value(ApplyResult::UnknownSuggestion).unwrap();
        assert_eq!(json["result"], "unknown_suggestion");

        let json = serde_json::to_value(ApplyResult::Recorded {
            agent_id: "agent-1".to_string(),
            suggestions_accepted: 1,
            success_rate: 1.0,
        })
        .unwrap();
        assert_eq!(json["result"], "recorded");
        assert_eq!(json["suggestionsAccepted"], 1);
    }
}
