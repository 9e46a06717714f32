//! evo storage - Turso document store
//!
//! Persists agent records, ecosystem snapshots and the evolution ledger in an
//! embedded Turso (SQLite-compatible) database.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │         evo-engine                          │
//! │  (factory, matcher, confidence, ledger)     │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │         evo-storage (this crate)            │
//! │  • insert-or-ignore agent creation          │
//! │  • compare-and-swap agent updates           │
//! │  • ledger append / claim                    │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │         Turso database (.evo/evo.db)        │
//! │  agents, ecosystems, evolutions,            │
//! │  suggestions, outcomes                      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod agent_store;
pub mod db;
pub mod ledger_store;

pub use agent_store::AgentListing;
pub use db::{Database, DbError, Result};
pub use ledger_store::StoredSuggestion;
