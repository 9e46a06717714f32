//! Evolution Ledger
//!
//! Durable record of change events, the responses and suggestions they
//! produced, and the outcomes reported for those suggestions.

use chrono::{DateTime, Utc};
use evo_core::{
    AgentResponse, ChangeEvent, Evolution, Outcome, Result, SuggestionRecord,
};
use evo_storage::Database;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened when an outcome was claimed against a suggestion
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// First outcome for this suggestion; it is now recorded
    Claimed(SuggestionRecord),
    AlreadyApplied,
    Unknown,
}

pub struct EvolutionLedger {
    db: Arc<Database>,
    /// Newest unapplied suggestions considered by `suggest` (0 = all)
    suggestion_window: usize,
}

impl EvolutionLedger {
    pub fn new(db: Arc<Database>, suggestion_window: usize) -> Self {
        Self {
            db,
            suggestion_window,
        }
    }

    /// Record the raw event. Returns `false` if `id` was already tracked.
    pub async fn record_event(
        &self,
        id: &str,
        event: &ChangeEvent,
        recorded_at: &DateTime<Utc>,
    ) -> Result<bool> {
        let inserted = self
            .db
            .insert_evolution_if_absent(id, event, recorded_at)
            .await?;
        if inserted {
            debug!("Tracked {} for {} as {}", event.change_type, event.file_path, id);
        }
        Ok(inserted)
    }

    /// Attach responses to a tracked event and persist their suggestions
    pub async fn record_responses(
        &self,
        evolution_id: &str,
        event: &ChangeEvent,
        responses: &[AgentResponse],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        self.db.set_evolution_responses(evolution_id, responses).await?;

        let records: Vec<SuggestionRecord> = responses
            .iter()
            .flat_map(|response| {
                response.suggestions.iter().map(move |suggestion| {
                    SuggestionRecord::from_response(evolution_id, event, response, suggestion, now)
                })
            })
            .collect();

        self.db.insert_suggestions(&records).await?;
        Ok(records.len())
    }

    pub async fn get(&self, evolution_id: &str) -> Result<Option<Evolution>> {
        Ok(self.db.get_evolution(evolution_id).await?)
    }

    /// Most recent evolutions first
    pub async fn history(&self, application_id: &str, limit: usize) -> Result<Vec<Evolution>> {
        Ok(self.db.list_evolutions(application_id, limit).await?)
    }

    /// The most recent unapplied suggestions ranked by priority, then
    /// confidence (highest first), then recency. `limit` of 0 means no limit.
    ///
    /// Only the newest `suggestion_window` suggestions are ranked, so an old
    /// critical suggestion ages out instead of outranking new work forever.
    pub async fn suggest(&self, application_id: &str, limit: usize) -> Result<Vec<SuggestionRecord>> {
        // Newest first from the store; the stable sort keeps that as the tie-breaker
        let mut suggestions = self
            .db
            .list_unapplied_suggestions(application_id, self.suggestion_window)
            .await?;
        suggestions.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });

        if limit > 0 {
            suggestions.truncate(limit);
        }
        Ok(suggestions)
    }

    /// Record an outcome against a suggestion, at most once
    pub async fn claim(
        &self,
        suggestion_id: &str,
        application_id: &str,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Result<Claim> {
        let Some(stored) = self.db.get_suggestion(suggestion_id, application_id).await? else {
            warn!(
                "Outcome for unknown suggestion {} in {}; ignoring",
                suggestion_id, application_id
            );
            return Ok(Claim::Unknown);
        };

        if stored.applied || !self.db.mark_suggestion_applied(&stored.record, &now).await? {
            info!("Suggestion {} already has an outcome", suggestion_id);
            return Ok(Claim::AlreadyApplied);
        }

        self.db
            .record_outcome(suggestion_id, application_id, outcome, &now)
            .await?;

        let mut record = stored.record;
        record.applied_at = Some(now);
        Ok(Claim::Claimed(record))
    }

    /// Hand a claimed suggestion back so its outcome can be reported again
    pub async fn release(&self, record: &SuggestionRecord) -> Result<()> {
        if self.db.release_suggestion_claim(record).await? {
            info!("Released claim on suggestion {}", record.id);
        }
        Ok(())
    }
}
