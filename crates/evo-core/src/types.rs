//! Agent-side type definitions: records, pattern memory, analysis input,
//! ecosystem snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{EvoError, Result};

/// Bound on `memory.successes` / `memory.failures`
pub const MAX_OUTCOME_ENTRIES: usize = 50;

/// Frequency at which a pattern is considered established and recorded as a learning
pub const ESTABLISHED_PATTERN_FREQUENCY: u64 = 5;

/// Agent priority, as assigned by the upstream analysis
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AgentPriority {
    Critical = 0,
    #[default]
    Important = 1,
    NiceToHave = 2,
}

impl AgentPriority {
    /// Sort rank, lower is more urgent
    pub fn rank(self) -> i64 {
        self as i64
    }
}

impl std::fmt::Display for AgentPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Important => write!(f, "important"),
            Self::NiceToHave => write!(f, "nice-to-have"),
        }
    }
}

impl std::str::FromStr for AgentPriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" | "0" => Ok(Self::Critical),
            "important" | "1" => Ok(Self::Important),
            "nice-to-have" | "nice_to_have" | "nicetohave" | "2" => Ok(Self::NiceToHave),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Population tier
///
/// Serialized as the bare number (1, 2 or 3). Suggestions without a tier are
/// on-demand, so they never count against the tier-2 cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Always-on, proactive
    Proactive = 1,
    /// Limited population per application
    Limited = 2,
    /// Invoked on demand
    #[default]
    OnDemand = 3,
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Proactive),
            2 => Ok(Self::Limited),
            3 => Ok(Self::OnDemand),
            other => Err(format!("Invalid tier: {} (expected 1, 2 or 3)", other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier as u8
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Learning,
    Active,
    Inactive,
    Error,
}

impl AgentStatus {
    /// Whether agents in this status take part in matching and default listings
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Learning | Self::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "learning" => Ok(Self::Learning),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Performance counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub suggestions_generated: u64,
    pub suggestions_accepted: u64,
    /// Outcomes reported with `success = false`
    #[serde(default)]
    pub suggestions_rejected: u64,
    pub success_rate: f64,
}

impl Performance {
    pub fn record_generated(&mut self) {
        self.suggestions_generated += 1;
        self.recompute();
    }

    pub fn record_accepted(&mut self) {
        self.suggestions_accepted += 1;
        self.recompute();
    }

    pub fn record_rejected(&mut self) {
        self.suggestions_rejected += 1;
    }

    /// Acceptance rate over reported outcomes, smoothed towards `prior`.
    ///
    /// `prior` counts as `weight` outcomes, so an agent with no outcomes
    /// scores exactly `prior`. An acceptance never lowers the rate and a
    /// rejection never raises it.
    pub fn outcome_rate(&self, prior: f64, weight: f64) -> f64 {
        let outcomes = (self.suggestions_accepted + self.suggestions_rejected) as f64;
        ((self.suggestions_accepted as f64 + prior * weight) / (outcomes + weight)).clamp(0.0, 1.0)
    }

    /// `accepted / max(1, generated)`, capped at 1.0
    fn recompute(&mut self) {
        let generated = self.suggestions_generated.max(1) as f64;
        self.success_rate = (self.suggestions_accepted as f64 / generated).min(1.0);
    }
}

/// A learned `(changeType, extension)` pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    /// Derived key, e.g. `file-modify_ts`
    pub pattern: String,
    pub frequency: u64,
    /// 0.0 to 1.0, grows with frequency
    pub confidence: f64,
    /// Most recent file paths, oldest first
    pub examples: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    /// Derive the memory key for a change type and file path
    pub fn key_for(change_type: &str, file_path: &str) -> String {
        let extension = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("none");
        format!("{}_{}", change_type, extension)
    }
}

/// Limits applied when a pattern is observed
#[derive(Debug, Clone, Copy)]
pub struct PatternLimits {
    /// Maximum example paths kept per pattern
    pub max_examples: usize,
    /// Confidence gained per observation
    pub confidence_step: f64,
}

/// What changed when a pattern was observed
#[derive(Debug, Clone, PartialEq)]
pub struct PatternObservation {
    /// Frequency before this observation (0 when the pattern is new)
    pub previous_frequency: u64,
    /// Pattern state after the observation
    pub pattern: Pattern,
}

/// Outcome entry kept in `memory.successes` / `memory.failures`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEntry {
    pub suggestion_id: String,
    pub suggestion_type: String,
    #[serde(default)]
    pub applied_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Something the agent learned about its workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub pattern: String,
    pub insight: String,
    pub learned_at: DateTime<Utc>,
}

/// Per-agent memory document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMemory {
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub successes: Vec<OutcomeEntry>,
    #[serde(default)]
    pub failures: Vec<OutcomeEntry>,
    #[serde(default)]
    pub learnings: Vec<Learning>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl AgentMemory {
    pub fn pattern(&self, key: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.pattern == key)
    }

    /// Record one observation of `key`.
    ///
    /// Keys stay unique: a repeat increments the frequency, refreshes
    /// `last_seen` (strictly later than before) and appends the example path.
    pub fn observe_pattern(
        &mut self,
        key: &str,
        example: &str,
        now: DateTime<Utc>,
        limits: PatternLimits,
    ) -> PatternObservation {
        let idx = match self.patterns.iter().position(|p| p.pattern == key) {
            Some(idx) => idx,
            None => {
                self.patterns.push(Pattern {
                    pattern: key.to_string(),
                    frequency: 0,
                    confidence: 0.0,
                    examples: Vec::new(),
                    last_seen: now,
                });
                self.patterns.len() - 1
            }
        };

        let pattern = &mut self.patterns[idx];
        let previous_frequency = pattern.frequency;

        pattern.frequency += 1;
        pattern.confidence = (pattern.frequency as f64 * limits.confidence_step).min(1.0);
        pattern.last_seen = if previous_frequency > 0 && now <= pattern.last_seen {
            pattern.last_seen + Duration::microseconds(1)
        } else {
            now
        };

        if !example.is_empty() {
            pattern.examples.retain(|e| e != example);
            pattern.examples.push(example.to_string());
            if pattern.examples.len() > limits.max_examples {
                let excess = pattern.examples.len() - limits.max_examples;
                pattern.examples.drain(..excess);
            }
        }

        let pattern = pattern.clone();

        if previous_frequency < ESTABLISHED_PATTERN_FREQUENCY
            && pattern.frequency >= ESTABLISHED_PATTERN_FREQUENCY
        {
            self.learnings.push(Learning {
                pattern: pattern.pattern.clone(),
                insight: format!(
                    "'{}' is a recurring change ({} occurrences)",
                    pattern.pattern, pattern.frequency
                ),
                learned_at: pattern.last_seen,
            });
        }

        PatternObservation {
            previous_frequency,
            pattern,
        }
    }

    pub fn record_success(&mut self, entry: OutcomeEntry) {
        push_bounded(&mut self.successes, entry);
    }

    pub fn record_failure(&mut self, entry: OutcomeEntry) {
        push_bounded(&mut self.failures, entry);
    }
}

fn push_bounded(entries: &mut Vec<OutcomeEntry>, entry: OutcomeEntry) {
    entries.push(entry);
    if entries.len() > MAX_OUTCOME_ENTRIES {
        let excess = entries.len() - MAX_OUTCOME_ENTRIES;
        entries.drain(..excess);
    }
}

/// A persisted agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub application_id: String,
    pub name: String,
    pub role: String,
    pub purpose: String,
    /// OR-combined glob / keyword patterns
    pub triggers: Vec<String>,
    pub capabilities: Vec<String>,
    pub priority: AgentPriority,
    pub tier: Tier,
    pub status: AgentStatus,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub memory: AgentMemory,
    /// Consecutive processing failures; reaching the configured threshold moves the agent to `error`
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Document version used for optimistic concurrency
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl AgentRecord {
    /// Stable identifier derived from `(application_id, name)`
    pub fn derive_id(application_id: &str, name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(application_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        format!("agent-{}", &hex::encode(digest)[..16])
    }

    /// Fresh `learning` agent with zeroed counters and empty memory
    pub fn from_suggestion(
        application_id: &str,
        suggestion: &SuggestedAgent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::derive_id(application_id, &suggestion.name),
            application_id: application_id.to_string(),
            name: suggestion.name.clone(),
            role: suggestion.role.clone(),
            purpose: suggestion.purpose.clone(),
            triggers: dedup_ordered(&suggestion.triggers),
            capabilities: suggestion.capabilities.clone(),
            priority: suggestion.priority,
            tier: suggestion.tier,
            status: AgentStatus::Learning,
            performance: Performance::default(),
            memory: AgentMemory::default(),
            consecutive_failures: 0,
            version: 0,
            created_at: now,
            last_active: now,
        }
    }
}

fn dedup_ordered(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|existing| existing == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Agent specification proposed by the upstream analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAgent {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub priority: AgentPriority,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Project analysis document produced by the upstream analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalysis {
    pub application_id: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub suggested_agents: Vec<SuggestedAgent>,
}

impl ProjectAnalysis {
    pub fn validate(&self) -> Result<()> {
        if self.application_id.trim().is_empty() {
            return Err(EvoError::validation("analysis is missing applicationId"));
        }

        for (idx, agent) in self.suggested_agents.iter().enumerate() {
            if agent.name.trim().is_empty() {
                return Err(EvoError::validation(format!(
                    "suggested agent #{} is missing a name",
                    idx
                )));
            }
        }

        Ok(())
    }
}

/// Operator patch applied to an existing agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub triggers: Option<Vec<String>>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<AgentPriority>,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl AgentUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.triggers.is_none()
            && self.capabilities.is_none()
            && self.priority.is_none()
            && self.purpose.is_none()
    }

    /// Apply the non-status fields; status goes through the state machine separately
    pub fn apply_fields(&self, agent: &mut AgentRecord) {
        if let Some(triggers) = &self.triggers {
            agent.triggers = dedup_ordered(triggers);
        }
        if let Some(capabilities) = &self.capabilities {
            agent.capabilities = capabilities.clone();
        }
        if let Some(priority) = self.priority {
            agent.priority = priority;
        }
        if let Some(purpose) = &self.purpose {
            agent.purpose = purpose.clone();
        }
    }
}

/// Derived summary of an application's agent population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcosystemSnapshot {
    pub application_id: String,
    pub agent_count: usize,
    /// Role histogram
    pub agent_types: BTreeMap<String, usize>,
    pub updated_at: DateTime<Utc>,
}

impl EcosystemSnapshot {
    pub fn from_agents(application_id: &str, agents: &[AgentRecord], now: DateTime<Utc>) -> Self {
        let mut agent_types = BTreeMap::new();
        for agent in agents {
            *agent_types.entry(agent.role.clone()).or_insert(0) += 1;
        }

        Self {
            application_id: application_id.to_string(),
            agent_count: agents.len(),
            agent_types,
            updated_at: now,
        }
    }
}
