//! # evo-engine
//!
//! The agent evolution engine.
//!
//! ```text
//! analysis ──► AgentFactory ──► agents (store)
//!                                  │
//! change event ──► TriggerMatcher ─┤
//!                                  ▼
//!                     ConfidenceCalculator (+ pattern memory)
//!                                  │
//!                     analysis / suggestions
//!                                  │
//!                          coordinate()
//!                                  │
//!                        EvolutionLedger ◄── apply(outcome)
//! ```
//!
//! [`EvolutionEngine`] is the entry point; the components are public for
//! callers that need them individually.

pub mod analysis;
pub mod confidence;
pub mod coordination;
mod engine;
pub mod factory;
pub mod ledger;
pub mod matcher;

pub use confidence::{ConfidenceCalculator, Score};
pub use coordination::coordinate;
pub use engine::EvolutionEngine;
pub use factory::AgentFactory;
pub use ledger::{Claim, EvolutionLedger};
