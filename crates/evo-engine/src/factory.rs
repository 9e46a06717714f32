//! Agent Factory
//!
//! Creates agent populations from project analyses. Creation is idempotent:
//! the store rejects a second `(applicationId, name)` and that rejection is a
//! silent no-op. The Tier-2 cap is a capacity policy, also silent.

use chrono::{Duration, Utc};
use evo_core::fail_open::fail_open;
use evo_core::{AgentRecord, EcosystemSnapshot, ProjectAnalysis, Result, Tier};
use evo_storage::Database;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

pub struct AgentFactory {
    db: Arc<Database>,
    tier2_cap: usize,
    /// Serializes population changes per application so the Tier-2 count
    /// cannot be read stale by a concurrent analysis
    app_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentFactory {
    pub fn new(db: Arc<Database>, tier2_cap: usize) -> Self {
        Self {
            db,
            tier2_cap,
            app_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_application(&self, application_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.app_locks.lock().await;
            locks
                .entry(application_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Create the agents an analysis suggests.
    ///
    /// Returns only the records created by this call.
    pub async fn create_from_analysis(&self, analysis: &ProjectAnalysis) -> Result<Vec<AgentRecord>> {
        analysis.validate()?;
        let _guard = self.lock_application(&analysis.application_id).await;
        self.create_locked(analysis).await
    }

    /// Delete every agent of the application and re-run creation.
    ///
    /// Prior documents are removed without being read, so corrupted state
    /// does not block the reset.
    pub async fn reset(&self, analysis: &ProjectAnalysis) -> Result<Vec<AgentRecord>> {
        analysis.validate()?;
        let app = analysis.application_id.as_str();
        let _guard = self.lock_application(app).await;

        let removed = self.db.delete_agents_for_application(app).await?;
        info!("Reset {}: removed {} agent(s)", app, removed);

        self.create_locked(analysis).await
    }

    async fn create_locked(&self, analysis: &ProjectAnalysis) -> Result<Vec<AgentRecord>> {
        let app = analysis.application_id.as_str();
        let now = Utc::now();

        let mut tier2_count = self.db.count_agents_in_tier(app, Tier::Limited).await? as usize;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut created = Vec::new();

        for suggestion in &analysis.suggested_agents {
            let name = suggestion.name.trim();

            if !seen.insert(name) {
                debug!("Analysis for {} repeats agent '{}', skipping", app, name);
                continue;
            }

            if self.db.agent_exists(app, name).await? {
                debug!("Agent '{}' already exists for {}", name, app);
                continue;
            }

            if suggestion.tier == Tier::Limited && tier2_count >= self.tier2_cap {
                info!(
                    "Tier-2 cap ({}) reached for {}, not creating '{}'",
                    self.tier2_cap, app, name
                );
                continue;
            }

            let mut normalized = suggestion.clone();
            normalized.name = name.to_string();

            // Offset creation times so listings keep the analysis order
            let created_at = now + Duration::microseconds(created.len() as i64);
            let record = AgentRecord::from_suggestion(app, &normalized, created_at);

            if self.db.insert_agent_if_absent(&record).await? {
                info!("Created agent '{}' ({}) tier {}", record.name, record.id, record.tier);
                if record.tier == Tier::Limited {
                    tier2_count += 1;
                }
                created.push(record);
            } else {
                debug!("Agent '{}' was created concurrently for {}", name, app);
            }
        }

        let db = Arc::clone(&self.db);
        fail_open("ecosystem_refresh", || refresh_ecosystem(db, app.to_string())).await;

        Ok(created)
    }

    /// Agents with status `learning` or `active`
    pub async fn get_active_agents(&self, application_id: &str) -> Result<Vec<AgentRecord>> {
        self.list_agents(application_id, false).await
    }

    /// All agents of an application, or only eligible ones
    pub async fn list_agents(
        &self,
        application_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<AgentRecord>> {
        let listing = self.db.list_agents(application_id).await?;
        if !listing.corrupted.is_empty() {
            warn!(
                "{} unreadable agent document(s) for {}",
                listing.corrupted.len(),
                application_id
            );
        }

        Ok(listing
            .agents
            .into_iter()
            .filter(|agent| include_inactive || agent.status.is_eligible())
            .collect())
    }

    /// Recompute and persist the ecosystem snapshot
    pub async fn refresh_ecosystem(&self, application_id: &str) -> Result<EcosystemSnapshot> {
        refresh_ecosystem(Arc::clone(&self.db), application_id.to_string()).await
    }

    /// Latest snapshot, or an empty one if none was ever computed
    pub async fn ecosystem(&self, application_id: &str) -> Result<EcosystemSnapshot> {
        Ok(self
            .db
            .get_ecosystem(application_id)
            .await?
            .unwrap_or_else(|| EcosystemSnapshot::from_agents(application_id, &[], Utc::now())))
    }
}

async fn refresh_ecosystem(db: Arc<Database>, application_id: String) -> Result<EcosystemSnapshot> {
    let listing = db.list_agents(&application_id).await?;
    let snapshot = EcosystemSnapshot::from_agents(&application_id, &listing.agents, Utc::now());
    db.upsert_ecosystem(&snapshot).await?;
    debug!(
        "Ecosystem for {}: {} agent(s)",
        application_id, snapshot.agent_count
    );
    Ok(snapshot)
}
