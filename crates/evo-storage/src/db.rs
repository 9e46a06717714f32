//! Database layer for evo using Turso.
//!
//! Every entity is stored as a JSON document next to the handful of columns
//! the engine filters, orders or constrains on.
//!
//! Architecture:
//!   - Database file: .evo/evo.db
//!   - WAL mode: Write-Ahead Logging for concurrent reads during writes
//!   - Schema: agents, ecosystems, evolutions, suggestions, outcomes
//!   - `agents` carries UNIQUE(application_id, name) and a `version` column;
//!     creation is insert-or-ignore, updates are compare-and-swap on version
//!
//! Connections:
//!   A turso `Connection` must not be used from two tasks at once, so every
//!   operation opens its own connection on the shared `turso::Database`.
//!   Reads run in parallel. Writes go through `writer()`, which serializes
//!   them in-process the way SQLite's single writer lock would; the
//!   read-modify-write of an agent still relies on the version check.

use chrono::{DateTime, SecondsFormat, Utc};
use evo_core::EvoError;
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};
use turso::{params, Builder, Connection};

/// Shared Turso database handle
pub struct Database {
    db: turso::Database,
    write_gate: Mutex<()>,
    path: String,
}

/// Exclusive write access: a fresh connection held with the write gate
pub(crate) struct Writer<'a> {
    pub(crate) conn: Connection,
    _gate: MutexGuard<'a, ()>,
}

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("turso error: {0}")]
    Turso(#[from] turso::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("corrupted document {id}: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for EvoError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::AgentNotFound(id) => EvoError::AgentNotFound(id),
            DbError::Io(e) => EvoError::Io(e),
            other => EvoError::Storage(other.to_string()),
        }
    }
}

impl Database {
    /// Open creates a new database connection at the specified path using Turso.
    ///
    /// The parent directory is created if needed. Call [`Database::init_schema`]
    /// before first use.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use evo_storage::Database;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(".evo/evo.db").await?;
    /// db.init_schema().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let db = Builder::new_local(&path_str).build().await?;

        // PRAGMA statements may return rows, so use query()
        let conn = db.connect()?;
        let _ = conn.query("PRAGMA journal_mode=WAL", params![]).await?;

        Ok(Database {
            db,
            write_gate: Mutex::new(()),
            path: path_str,
        })
    }

    /// A new connection for one read operation
    pub(crate) async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect()?;
        let _ = conn.query("PRAGMA busy_timeout=5000", params![]).await?;
        Ok(conn)
    }

    /// A new connection holding the write gate until dropped
    pub(crate) async fn writer(&self) -> Result<Writer<'_>> {
        let gate = self.write_gate.lock().await;
        let conn = self.connect().await?;
        Ok(Writer { conn, _gate: gate })
    }

    /// Returns the database file path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create tables and indexes if they don't exist. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = vec![
            r#"CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                application_id TEXT NOT NULL,
                name TEXT NOT NULL,
                tier INTEGER NOT NULL,
                status TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                doc TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (application_id, name)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS ecosystems (
                application_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS evolutions (
                id TEXT PRIMARY KEY,
                application_id TEXT NOT NULL,
                event TEXT NOT NULL,
                responses TEXT NOT NULL DEFAULT '[]',
                recorded_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS suggestions (
                id TEXT PRIMARY KEY,
                evolution_id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                applied INTEGER NOT NULL DEFAULT 0,
                doc TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS outcomes (
                suggestion_id TEXT PRIMARY KEY,
                application_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                doc TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_agents_app ON agents(application_id)",
            "CREATE INDEX IF NOT EXISTS idx_agents_app_tier ON agents(application_id, tier)",
            "CREATE INDEX IF NOT EXISTS idx_evolutions_app ON evolutions(application_id, recorded_at)",
            "CREATE INDEX IF NOT EXISTS idx_suggestions_app ON suggestions(application_id, applied)",
            "CREATE INDEX IF NOT EXISTS idx_suggestions_evolution ON suggestions(evolution_id)",
        ];

        let writer = self.writer().await?;
        for stmt in statements {
            writer.conn.execute(stmt, params![]).await?;
        }

        Ok(())
    }

    /// Run a `SELECT COUNT(*)`-style query
    pub(crate) async fn count(&self, query: &str, params_vec: Vec<turso::Value>) -> Result<i64> {
        let conn = self.connect().await?;
        let mut rows = conn.query(query, params_vec).await?;

        if let Some(row) = rows.next().await? {
            Ok(row.get(0)?)
        } else {
            Ok(0)
        }
    }
}

/// Timestamps are stored in one fixed RFC 3339 shape so they sort as text
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| DbError::Other(format!("failed to parse timestamp '{}': {}", raw, e)))?
        .with_timezone(&Utc))
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_db;
    use super::*;

    #[tokio::test]
    async fn test_database_open_and_init() {
        let (_dir, db) = temp_db().await;

        // Idempotent
        db.init_schema().await.unwrap();

        let count = db
            .count("SELECT COUNT(*) FROM agents", Vec::new())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(db.path().ends_with("evo.db"));
    }

    #[test]
    fn test_time_round_trip_sorts() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(5);
        let a = to_db_time(&earlier);
        let b = to_db_time(&later);
        assert!(a < b);
        assert_eq!(from_db_time(&a).unwrap().timestamp_micros(), earlier.timestamp_micros());
    }

    #[test]
    fn test_error_mapping() {
        let err: EvoError = DbError::AgentNotFound("agent-1".to_string()).into();
        assert!(matches!(err, EvoError::AgentNotFound(_)));

        let err: EvoError = DbError::Other("boom".to_string()).into();
        assert_eq!(err.category(), evo_core::ErrorCategory::TransientService);
    }
}
