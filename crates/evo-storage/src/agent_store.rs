//! Agent and ecosystem documents.

use evo_core::{AgentRecord, EcosystemSnapshot, Tier};
use tracing::{debug, warn};
use turso::params;

use crate::db::{from_db_time, to_db_time, Database, DbError, Result};

/// Agents read for one application, plus ids whose documents could not be parsed
#[derive(Debug, Clone, Default)]
pub struct AgentListing {
    pub agents: Vec<AgentRecord>,
    pub corrupted: Vec<String>,
}

impl Database {
    /// Insert an agent unless one with the same id or `(application_id, name)` exists.
    ///
    /// Returns `true` if the row was created. The uniqueness constraint makes
    /// the check and the insert a single atomic step.
    pub async fn insert_agent_if_absent(&self, agent: &AgentRecord) -> Result<bool> {
        let doc = serde_json::to_string(agent)?;

        let query = r#"
            INSERT INTO agents (id, application_id, name, tier, status, version, doc, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
        "#;

        let writer = self.writer().await?;
        let inserted = writer
            .conn
            .execute(
                query,
                params![
                    agent.id.clone(),
                    agent.application_id.clone(),
                    agent.name.clone(),
                    i64::from(u8::from(agent.tier)),
                    agent.status.as_str(),
                    agent.version as i64,
                    doc,
                    to_db_time(&agent.created_at),
                ],
            )
            .await?;

        Ok(inserted > 0)
    }

    /// Whether an agent with this `(application_id, name)` exists
    pub async fn agent_exists(&self, application_id: &str, name: &str) -> Result<bool> {
        let count = self
            .count(
                "SELECT COUNT(*) FROM agents WHERE application_id = ? AND name = ?",
                vec![application_id.into(), name.into()],
            )
            .await?;
        Ok(count > 0)
    }

    /// Number of agents in `tier` for an application
    pub async fn count_agents_in_tier(&self, application_id: &str, tier: Tier) -> Result<i64> {
        self.count(
            "SELECT COUNT(*) FROM agents WHERE application_id = ? AND tier = ?",
            vec![application_id.into(), i64::from(u8::from(tier)).into()],
        )
        .await
    }

    /// Fetch one agent by id
    pub async fn get_agent(&self, id: &str) -> Result<AgentRecord> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT id, version, doc FROM agents WHERE id = ?", params![id])
            .await?;

        if let Some(row) = rows.next().await? {
            parse_agent_row(&row)
        } else {
            Err(DbError::AgentNotFound(id.to_string()))
        }
    }

    /// All agents of an application, oldest first.
    ///
    /// Unparseable documents are skipped and reported in `corrupted`.
    pub async fn list_agents(&self, application_id: &str) -> Result<AgentListing> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, version, doc FROM agents
                 WHERE application_id = ?
                 ORDER BY created_at ASC, id ASC",
                params![application_id],
            )
            .await?;

        let mut listing = AgentListing::default();
        while let Some(row) = rows.next().await? {
            match parse_agent_row(&row) {
                Ok(agent) => listing.agents.push(agent),
                Err(DbError::Corrupted { id, reason }) => {
                    warn!("Skipping corrupted agent {}: {}", id, reason);
                    listing.corrupted.push(id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(listing)
    }

    /// Replace an agent document if nobody wrote it since `expected_version`.
    ///
    /// On success the stored version becomes `expected_version + 1` and the
    /// caller's copy is updated to match. Returns `false` on a lost race.
    pub async fn compare_and_swap_agent(
        &self,
        agent: &mut AgentRecord,
        expected_version: u64,
    ) -> Result<bool> {
        let next_version = expected_version + 1;
        let mut candidate = agent.clone();
        candidate.version = next_version;
        let doc = serde_json::to_string(&candidate)?;

        let query = r#"
            UPDATE agents
            SET doc = ?, status = ?, tier = ?, version = ?
            WHERE id = ? AND version = ?
        "#;

        let writer = self.writer().await?;
        let updated = writer
            .conn
            .execute(
                query,
                params![
                    doc,
                    candidate.status.as_str(),
                    i64::from(u8::from(candidate.tier)),
                    next_version as i64,
                    candidate.id.clone(),
                    expected_version as i64,
                ],
            )
            .await?;

        if updated > 0 {
            *agent = candidate;
            Ok(true)
        } else {
            debug!(
                "CAS miss on agent {} at version {}",
                agent.id, expected_version
            );
            Ok(false)
        }
    }

    /// Delete one agent, readable or not.
    ///
    /// Returns the owning application id, or `None` if the agent did not exist.
    pub async fn delete_agent(&self, id: &str) -> Result<Option<String>> {
        let writer = self.writer().await?;
        let application_id: String = {
            let mut rows = writer
                .conn
                .query("SELECT application_id FROM agents WHERE id = ?", params![id])
                .await?;
            match rows.next().await? {
                Some(row) => row.get(0)?,
                None => return Ok(None),
            }
        };

        let deleted = writer
            .conn
            .execute("DELETE FROM agents WHERE id = ?", params![id])
            .await?;

        Ok((deleted > 0).then_some(application_id))
    }

    /// Delete every agent of an application, readable or not
    pub async fn delete_agents_for_application(&self, application_id: &str) -> Result<u64> {
        let writer = self.writer().await?;
        let deleted = writer
            .conn
            .execute(
                "DELETE FROM agents WHERE application_id = ?",
                params![application_id],
            )
            .await?;
        Ok(deleted)
    }

    /// Store the latest ecosystem snapshot for an application
    pub async fn upsert_ecosystem(&self, snapshot: &EcosystemSnapshot) -> Result<()> {
        let doc = serde_json::to_string(snapshot)?;

        let query = r#"
            INSERT INTO ecosystems (application_id, doc, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(application_id) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at
        "#;

        let writer = self.writer().await?;
        writer
            .conn
            .execute(
                query,
                params![
                    snapshot.application_id.clone(),
                    doc,
                    to_db_time(&snapshot.updated_at),
                ],
            )
            .await?;

        Ok(())
    }

    /// Latest ecosystem snapshot, if one was ever computed
    pub async fn get_ecosystem(&self, application_id: &str) -> Result<Option<EcosystemSnapshot>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT doc, updated_at FROM ecosystems WHERE application_id = ?",
                params![application_id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            let doc: String = row.get(0)?;
            let updated_at: String = row.get(1)?;
            let mut snapshot: EcosystemSnapshot = serde_json::from_str(&doc)?;
            snapshot.updated_at = from_db_time(&updated_at)?;
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }
}

/// Parse `(id, version, doc)`; the version column is authoritative
fn parse_agent_row(row: &turso::Row) -> Result<AgentRecord> {
    let id: String = row.get(0)?;
    let version: i64 = row.get(1)?;
    let doc: String = row.get(2)?;

    let mut agent: AgentRecord = serde_json::from_str(&doc).map_err(|e| DbError::Corrupted {
        id: id.clone(),
        reason: e.to_string(),
    })?;
    agent.version = version.max(0) as u64;
    Ok(agent)
}
