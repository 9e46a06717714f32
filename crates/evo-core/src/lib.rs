//! # evo-core
//!
//! Core types for the evo agent evolution engine.
//!
//! evo keeps a population of specialized agents per application. Each agent
//! watches change events through its triggers, remembers the
//! `(changeType, extension)` patterns it has seen, and proposes improvements
//! whose confidence grows with recognition and with accepted outcomes.
//!
//! This crate holds what every other evo crate shares:
//! - Agent records, pattern memory and ecosystem snapshots
//! - Change events, agent responses, suggestions and outcomes
//! - The agent status state machine
//! - Configuration and the error taxonomy

pub mod config;
mod error;
mod event;
pub mod fail_open;
pub mod status;
mod types;

pub use config::EvoConfig;
pub use error::{ErrorCategory, EvoError, Result};
pub use event::*;
pub use types::*;
