//! Engine facade
//!
//! Ties the factory, matcher, confidence calculator, coordination layer and
//! ledger together. Every agent write is a compare-and-swap on the agent's
//! document version, retried a bounded number of times.

use chrono::{DateTime, Utc};
use evo_core::fail_open::fail_open;
use evo_core::{
    status, AgentMemory, AgentRecord, AgentResponse, AgentStatus, AgentUpdate, ApplyRequest,
    ApplyResult, ChangeEvent, EcosystemSnapshot, EvoConfig, EvoError, Evolution, OutcomeEntry,
    ProjectAnalysis, Result, SuggestionRecord,
};
use evo_storage::Database;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::analysis;
use crate::confidence::ConfidenceCalculator;
use crate::coordination::coordinate;
use crate::factory::AgentFactory;
use crate::ledger::{Claim, EvolutionLedger};
use crate::matcher;

pub struct EvolutionEngine {
    db: Arc<Database>,
    config: EvoConfig,
    factory: AgentFactory,
    calculator: ConfidenceCalculator,
    ledger: EvolutionLedger,
}

impl EvolutionEngine {
    /// Open (or create) the store configured for `root` and build an engine
    pub async fn open(root: &Path, config: EvoConfig) -> Result<Self> {
        let path = config.database_path(root);
        info!("Opening evo store at {}", path.display());

        let db = Database::open(&path).await?;
        db.init_schema().await?;
        Ok(Self::new(Arc::new(db), config))
    }

    pub fn new(db: Arc<Database>, config: EvoConfig) -> Self {
        Self {
            factory: AgentFactory::new(Arc::clone(&db), config.population.tier2_cap),
            calculator: ConfidenceCalculator::new(&config),
            ledger: EvolutionLedger::new(Arc::clone(&db), config.ledger.suggestion_window),
            db,
            config,
        }
    }

    pub fn config(&self) -> &EvoConfig {
        &self.config
    }

    // ----- Agent population -----

    /// Create the agents an analysis suggests; returns only the new ones
    pub async fn create_agents_from_analysis(
        &self,
        analysis: &ProjectAnalysis,
    ) -> Result<Vec<AgentRecord>> {
        self.factory.create_from_analysis(analysis).await
    }

    /// Delete and re-derive an application's agents
    pub async fn reset_agents(&self, analysis: &ProjectAnalysis) -> Result<Vec<AgentRecord>> {
        self.factory.reset(analysis).await
    }

    pub async fn get_active_agents(&self, application_id: &str) -> Result<Vec<AgentRecord>> {
        self.factory.get_active_agents(application_id).await
    }

    pub async fn list_agents(
        &self,
        application_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<AgentRecord>> {
        self.factory.list_agents(application_id, include_inactive).await
    }

    pub async fn get_agent(&self, id: &str) -> Result<AgentRecord> {
        Ok(self.db.get_agent(id).await?)
    }

    pub async fn get_agent_memory(&self, id: &str) -> Result<AgentMemory> {
        Ok(self.get_agent(id).await?.memory)
    }

    /// Apply an operator patch; status changes must be legal transitions
    pub async fn update_agent(&self, id: &str, update: &AgentUpdate) -> Result<AgentRecord> {
        if update.is_empty() {
            return self.get_agent(id).await;
        }

        let agent = self
            .modify_agent(id, |agent| {
                if let Some(target) = update.status {
                    agent.status = status::transition(agent.status, target)?;
                    if target != AgentStatus::Error {
                        agent.consecutive_failures = 0;
                    }
                }
                update.apply_fields(agent);
                Ok(true)
            })
            .await?;

        info!("Updated agent {} (status {})", agent.id, agent.status);
        Ok(agent)
    }

    /// Move an agent back to `learning` and clear its failure count
    pub async fn reset_agent_status(&self, id: &str) -> Result<AgentRecord> {
        let agent = self
            .modify_agent(id, |agent| {
                agent.status = status::transition(agent.status, AgentStatus::Learning)?;
                agent.consecutive_failures = 0;
                Ok(true)
            })
            .await?;

        info!("Agent {} reset to {}", agent.id, agent.status);
        Ok(agent)
    }

    pub async fn delete_agent(&self, id: &str) -> Result<()> {
        let application_id = self
            .db
            .delete_agent(id)
            .await?
            .ok_or_else(|| EvoError::AgentNotFound(id.to_string()))?;

        info!("Deleted agent {} from {}", id, application_id);
        fail_open("ecosystem_refresh", || {
            self.factory.refresh_ecosystem(&application_id)
        })
        .await;
        Ok(())
    }

    pub async fn ecosystem(&self, application_id: &str) -> Result<EcosystemSnapshot> {
        self.factory.ecosystem(application_id).await
    }

    // ----- Change events -----

    /// Eligible agents whose triggers match the event
    pub async fn match_agents(&self, event: &ChangeEvent) -> Result<Vec<AgentRecord>> {
        let agents = self.factory.get_active_agents(&event.application_id).await?;
        Ok(matcher::match_agents(agents, event))
    }

    /// Record a change event and let matching agents respond.
    ///
    /// The raw event is made durable first; a repeat of a known `eventId`
    /// returns the evolution recorded the first time.
    #[instrument(skip(self, event), fields(app = %event.application_id, file = %event.file_path))]
    pub async fn track(&self, event: ChangeEvent) -> Result<Evolution> {
        let evolution_id = event
            .event_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        if !self.ledger.record_event(&evolution_id, &event, &now).await? {
            let existing = self
                .ledger
                .get(&evolution_id)
                .await?
                .ok_or_else(|| EvoError::EvolutionNotFound(evolution_id.clone()))?;
            if existing.event.application_id != event.application_id {
                return Err(EvoError::validation(format!(
                    "eventId {} was already tracked for another application",
                    evolution_id
                )));
            }
            info!("Event {} already tracked", evolution_id);
            return Ok(existing);
        }

        let matched = self.match_agents(&event).await?;
        let mut responses = Vec::with_capacity(matched.len());

        for agent in &matched {
            match self.respond(&agent.id, &event, now).await {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => {}
                Err(e) if counts_against_agent(&e) => {
                    warn!("Agent {} failed on {}: {}", agent.id, evolution_id, e);
                    fail_open("record_agent_failure", || self.record_failure(&agent.id)).await;
                }
                Err(e) => {
                    warn!("Agent {} skipped {}: {}", agent.id, evolution_id, e);
                }
            }
        }

        let responses = coordinate(responses);
        if !responses.is_empty() {
            let stored = self
                .ledger
                .record_responses(&evolution_id, &event, &responses, now)
                .await?;
            debug!(
                "{} response(s), {} suggestion(s) for {}",
                responses.len(),
                stored,
                evolution_id
            );
        }

        Ok(Evolution {
            id: evolution_id,
            event,
            responses,
            recorded_at: now,
        })
    }

    /// Score one agent against the event and persist what it learned.
    ///
    /// `None` when the agent vanished or became ineligible since matching.
    async fn respond(
        &self,
        agent_id: &str,
        event: &ChangeEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<AgentResponse>> {
        let mut produced = None;

        let result = self
            .modify_agent(agent_id, |agent| {
                produced = None;
                if !agent.status.is_eligible() {
                    return Ok(false);
                }

                let score = self.calculator.score(agent, event, now);
                agent.consecutive_failures = 0;

                produced = Some(AgentResponse {
                    agent_id: agent.id.clone(),
                    agent_name: agent.name.clone(),
                    analysis: analysis::analyze(agent, event, &score),
                    suggestions: analysis::suggest(agent, event),
                    confidence: score.confidence,
                    pattern_key: score.pattern_key,
                    coordination: None,
                });
                Ok(true)
            })
            .await;

        match result {
            Ok(_) => Ok(produced),
            Err(EvoError::AgentNotFound(_)) => {
                debug!("Agent {} disappeared before responding", agent_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn record_failure(&self, agent_id: &str) -> Result<AgentRecord> {
        let threshold = self.config.agents.error_threshold;
        let agent = self
            .modify_agent(agent_id, |agent| {
                agent.consecutive_failures += 1;
                agent.status =
                    status::after_failure(agent.status, agent.consecutive_failures, threshold);
                Ok(true)
            })
            .await?;

        if agent.status == AgentStatus::Error {
            warn!(
                "Agent {} moved to error after {} consecutive failures",
                agent.id, agent.consecutive_failures
            );
        }
        Ok(agent)
    }

    /// Read-modify-write an agent with optimistic concurrency.
    ///
    /// `mutate` returns `false` to skip the write. Each attempt starts from a
    /// fresh read, so `mutate` may run more than once.
    async fn modify_agent<F>(&self, id: &str, mut mutate: F) -> Result<AgentRecord>
    where
        F: FnMut(&mut AgentRecord) -> Result<bool>,
    {
        let attempts = self.config.agents.max_update_retries.max(1);

        for attempt in 1..=attempts {
            let mut agent = self.db.get_agent(id).await?;
            let expected = agent.version;

            if !mutate(&mut agent)? {
                return Ok(agent);
            }

            if self.db.compare_and_swap_agent(&mut agent, expected).await? {
                return Ok(agent);
            }

            debug!(
                "Agent {} changed concurrently (attempt {}/{})",
                id, attempt, attempts
            );
            tokio::task::yield_now().await;
        }

        Err(EvoError::Busy(format!(
            "{} still contended after {} attempts",
            id, attempts
        )))
    }

    // ----- Ledger -----

    pub async fn history(&self, application_id: &str, limit: Option<usize>) -> Result<Vec<Evolution>> {
        let limit = limit.unwrap_or(self.config.ledger.default_history_limit);
        self.ledger.history(application_id, limit).await
    }

    pub async fn suggest(
        &self,
        application_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SuggestionRecord>> {
        let limit = limit.unwrap_or(self.config.ledger.default_suggestion_limit);
        self.ledger.suggest(application_id, limit).await
    }

    /// Record an outcome and feed it back to the originating agent.
    ///
    /// Unknown or already-applied suggestions are reported, not failed.
    pub async fn apply(&self, request: &ApplyRequest) -> Result<ApplyResult> {
        let suggestion_id = request.suggestion_id.trim();
        let application_id = request.application_id.trim();
        if suggestion_id.is_empty() {
            return Err(EvoError::validation("apply request is missing suggestionId"));
        }
        if application_id.is_empty() {
            return Err(EvoError::validation("apply request is missing applicationId"));
        }

        let now = Utc::now();
        let record = match self
            .ledger
            .claim(suggestion_id, application_id, &request.outcome, now)
            .await?
        {
            Claim::Claimed(record) => record,
            Claim::AlreadyApplied => return Ok(ApplyResult::AlreadyApplied),
            Claim::Unknown => return Ok(ApplyResult::UnknownSuggestion),
        };

        let outcome = &request.outcome;
        let feedback = self
            .modify_agent(&record.agent_id, |agent| {
                let entry = OutcomeEntry {
                    suggestion_id: record.id.clone(),
                    suggestion_type: record.kind.clone(),
                    applied_types: outcome.applied_types.clone(),
                    notes: outcome.notes.clone(),
                    recorded_at: now,
                };
                if outcome.success {
                    agent.performance.record_accepted();
                    agent.memory.record_success(entry);
                } else {
                    agent.performance.record_rejected();
                    agent.memory.record_failure(entry);
                }
                Ok(true)
            })
            .await;

        match feedback {
            Ok(agent) => {
                info!(
                    "Outcome for {} (success: {}) -> agent {} success rate {:.2}",
                    record.id, outcome.success, agent.id, agent.performance.success_rate
                );
                Ok(ApplyResult::Recorded {
                    agent_id: agent.id,
                    suggestions_accepted: agent.performance.suggestions_accepted,
                    success_rate: agent.performance.success_rate,
                })
            }
            Err(EvoError::AgentNotFound(_)) => {
                warn!(
                    "Outcome for {} recorded but agent {} is gone",
                    record.id, record.agent_id
                );
                Ok(ApplyResult::AgentGone)
            }
            Err(e) => {
                // Unclaim so a retry of the same outcome reaches the agent
                warn!("Outcome for {} not fed back: {}", record.id, e);
                fail_open("release_suggestion_claim", || self.ledger.release(&record)).await;
                Err(e)
            }
        }
    }
}

/// Whether an error while scoring counts towards the agent's failure streak.
///
/// Contention and store outages say nothing about the agent itself.
fn counts_against_agent(err: &EvoError) -> bool {
    !matches!(
        err,
        EvoError::Busy(_) | EvoError::Storage(_) | EvoError::Io(_)
    )
}
