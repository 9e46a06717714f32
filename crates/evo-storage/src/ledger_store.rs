//! Evolution ledger: raw change events, the responses they produced,
//! suggestions and applied outcomes.

use chrono::{DateTime, Utc};
use evo_core::{AgentResponse, ChangeEvent, Evolution, Outcome, SuggestionRecord};
use tracing::warn;
use turso::params;

use crate::db::{from_db_time, to_db_time, Database, Result};

/// A suggestion row together with its applied flag
#[derive(Debug, Clone)]
pub struct StoredSuggestion {
    pub record: SuggestionRecord,
    pub applied: bool,
}

impl Database {
    /// Record a raw change event under `id`.
    ///
    /// Returns `false` if an evolution with this id already exists; the
    /// existing row is left untouched.
    pub async fn insert_evolution_if_absent(
        &self,
        id: &str,
        event: &ChangeEvent,
        recorded_at: &DateTime<Utc>,
    ) -> Result<bool> {
        let event_json = serde_json::to_string(event)?;

        let writer = self.writer().await?;
        let inserted = writer
            .conn
            .execute(
                r#"INSERT INTO evolutions (id, application_id, event, responses, recorded_at)
                   VALUES (?, ?, ?, '[]', ?)
                   ON CONFLICT(id) DO NOTHING"#,
                params![
                    id,
                    event.application_id.clone(),
                    event_json,
                    to_db_time(recorded_at),
                ],
            )
            .await?;

        Ok(inserted > 0)
    }

    /// Attach the (coordinated) responses to an evolution
    pub async fn set_evolution_responses(
        &self,
        id: &str,
        responses: &[AgentResponse],
    ) -> Result<()> {
        let responses_json = serde_json::to_string(responses)?;
        let writer = self.writer().await?;
        writer
            .conn
            .execute(
                "UPDATE evolutions SET responses = ? WHERE id = ?",
                params![responses_json, id],
            )
            .await?;
        Ok(())
    }

    pub async fn get_evolution(&self, id: &str) -> Result<Option<Evolution>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, event, responses, recorded_at FROM evolutions WHERE id = ?",
                params![id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(parse_evolution_row(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Most recent evolutions first. Unreadable rows are skipped.
    pub async fn list_evolutions(&self, application_id: &str, limit: usize) -> Result<Vec<Evolution>> {
        let mut query = String::from(
            "SELECT id, event, responses, recorded_at FROM evolutions
             WHERE application_id = ?
             ORDER BY recorded_at DESC, id DESC",
        );
        let mut params_vec: Vec<turso::Value> = vec![application_id.into()];

        if limit > 0 {
            query.push_str(" LIMIT ?");
            params_vec.push((limit as i64).into());
        }

        let conn = self.connect().await?;
        let mut rows = conn.query(&query, params_vec).await?;
        let mut evolutions = Vec::new();

        while let Some(row) = rows.next().await? {
            match parse_evolution_row(&row) {
                Ok(evolution) => evolutions.push(evolution),
                Err(e) => warn!("Skipping unreadable evolution row: {}", e),
            }
        }

        Ok(evolutions)
    }

    /// Insert suggestions; ids already present are left alone
    pub async fn insert_suggestions(&self, suggestions: &[SuggestionRecord]) -> Result<()> {
        let query = r#"
            INSERT INTO suggestions (id, evolution_id, application_id, agent_id, applied, doc, created_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(id) DO NOTHING
        "#;

        let writer = self.writer().await?;
        for suggestion in suggestions {
            let doc = serde_json::to_string(suggestion)?;
            writer
                .conn
                .execute(
                    query,
                    params![
                        suggestion.id.clone(),
                        suggestion.evolution_id.clone(),
                        suggestion.application_id.clone(),
                        suggestion.agent_id.clone(),
                        doc,
                        to_db_time(&suggestion.created_at),
                    ],
                )
                .await?;
        }

        Ok(())
    }

    /// Look up a suggestion within an application
    pub async fn get_suggestion(
        &self,
        id: &str,
        application_id: &str,
    ) -> Result<Option<StoredSuggestion>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT doc, applied FROM suggestions WHERE id = ? AND application_id = ?",
                params![id, application_id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(parse_suggestion_row(&row)?))
        } else {
            Ok(None)
        }
    }

    /// The `window` most recent unapplied suggestions of an application,
    /// newest first. A `window` of 0 reads them all.
    pub async fn list_unapplied_suggestions(
        &self,
        application_id: &str,
        window: usize,
    ) -> Result<Vec<SuggestionRecord>> {
        let mut query = String::from(
            "SELECT doc, applied FROM suggestions
             WHERE application_id = ? AND applied = 0
             ORDER BY created_at DESC, id ASC",
        );
        let mut params_vec: Vec<turso::Value> = vec![application_id.into()];

        if window > 0 {
            query.push_str(" LIMIT ?");
            params_vec.push((window as i64).into());
        }

        let conn = self.connect().await?;
        let mut rows = conn.query(&query, params_vec).await?;

        let mut suggestions = Vec::new();
        while let Some(row) = rows.next().await? {
            match parse_suggestion_row(&row) {
                Ok(stored) => suggestions.push(stored.record),
                Err(e) => warn!("Skipping unreadable suggestion row: {}", e),
            }
        }

        Ok(suggestions)
    }

    /// Claim a suggestion for an outcome.
    ///
    /// Only the first caller wins; returns `false` if it was already applied
    /// (or does not exist).
    pub async fn mark_suggestion_applied(
        &self,
        record: &SuggestionRecord,
        applied_at: &DateTime<Utc>,
    ) -> Result<bool> {
        let mut applied = record.clone();
        applied.applied_at = Some(*applied_at);
        let doc = serde_json::to_string(&applied)?;

        let writer = self.writer().await?;
        let updated = writer
            .conn
            .execute(
                "UPDATE suggestions SET applied = 1, doc = ? WHERE id = ? AND applied = 0",
                params![doc, record.id.clone()],
            )
            .await?;

        Ok(updated > 0)
    }

    /// Undo a claim whose outcome could not be fed back.
    ///
    /// The suggestion becomes unapplied again and its outcome row is removed,
    /// so the caller can report the outcome once more. Returns `false` if the
    /// suggestion was not claimed.
    pub async fn release_suggestion_claim(&self, record: &SuggestionRecord) -> Result<bool> {
        let mut released = record.clone();
        released.applied_at = None;
        let doc = serde_json::to_string(&released)?;

        let writer = self.writer().await?;
        let updated = writer
            .conn
            .execute(
                "UPDATE suggestions SET applied = 0, doc = ? WHERE id = ? AND applied = 1",
                params![doc, record.id.clone()],
            )
            .await?;
        writer
            .conn
            .execute(
                "DELETE FROM outcomes WHERE suggestion_id = ?",
                params![record.id.clone()],
            )
            .await?;

        Ok(updated > 0)
    }

    /// Persist the outcome reported for a suggestion
    pub async fn record_outcome(
        &self,
        suggestion_id: &str,
        application_id: &str,
        outcome: &Outcome,
        recorded_at: &DateTime<Utc>,
    ) -> Result<()> {
        let doc = serde_json::to_string(outcome)?;

        let writer = self.writer().await?;
        writer
            .conn
            .execute(
                r#"INSERT INTO outcomes (suggestion_id, application_id, success, doc, recorded_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT(suggestion_id) DO NOTHING"#,
                params![
                    suggestion_id,
                    application_id,
                    if outcome.success { 1i64 } else { 0i64 },
                    doc,
                    to_db_time(recorded_at),
                ],
            )
            .await?;

        Ok(())
    }

    /// Outcome recorded for a suggestion, if any
    pub async fn get_outcome(&self, suggestion_id: &str) -> Result<Option<Outcome>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT doc FROM outcomes WHERE suggestion_id = ?",
                params![suggestion_id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            let doc: String = row.get(0)?;
            Ok(Some(serde_json::from_str(&doc)?))
        } else {
            Ok(None)
        }
    }
}

fn parse_evolution_row(row: &turso::Row) -> Result<Evolution> {
    let id: String = row.get(0)?;
    let event_json: String = row.get(1)?;
    let responses_json: String = row.get(2)?;
    let recorded_at: String = row.get(3)?;

    Ok(Evolution {
        id,
        event: serde_json::from_str(&event_json)?,
        responses: serde_json::from_str(&responses_json)?,
        recorded_at: from_db_time(&recorded_at)?,
    })
}

fn parse_suggestion_row(row: &turso::Row) -> Result<StoredSuggestion> {
    let doc: String = row.get(0)?;
    let applied: i64 = row.get(1)?;

    Ok(StoredSuggestion {
        record: serde_json::from_str(&doc)?,
        applied: applied != 0,
    })
}
