//! Unified error types for evo

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all evo operations
#[derive(Error, Debug)]
pub enum EvoError {
    // Request errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    // Lookup errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Evolution not found: {0}")]
    EvolutionNotFound(String),

    // Contention
    #[error("Agent busy: {0}")]
    Busy(String),

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Stable, caller-facing error categories.
///
/// Every [`EvoError`] collapses onto one of these at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The request was malformed or asked for something illegal
    Validation,
    /// The referenced entity does not exist (or no longer exists)
    NotFound,
    /// The engine declined the work for capacity reasons; retry later
    CapacityLimited,
    /// Storage or another dependency failed; the request may be retried
    TransientService,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::CapacityLimited => write!(f, "capacity_limited"),
            Self::TransientService => write!(f, "transient_service"),
        }
    }
}

impl EvoError {
    /// Shorthand for a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Category this error is reported under
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::InvalidTransition(_) => ErrorCategory::Validation,
            Self::AgentNotFound(_) | Self::EvolutionNotFound(_) => ErrorCategory::NotFound,
            Self::Busy(_) => ErrorCategory::CapacityLimited,
            Self::Storage(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Other(_) => ErrorCategory::TransientService,
        }
    }

    /// Whether the caller can reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::CapacityLimited | ErrorCategory::TransientService
        )
    }
}

/// Result type alias using EvoError
pub type Result<T> = std::result::Result<T, EvoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            EvoError::validation("missing filePath").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            EvoError::InvalidTransition("inactive -> active".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            EvoError::AgentNotFound("agent-1".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            EvoError::Busy("agent-1".into()).category(),
            ErrorCategory::CapacityLimited
        );
        assert_eq!(
            EvoError::Storage("disk full".into()).category(),
            ErrorCategory::TransientService
        );
    }

    #[test]
    fn test_retryable() {
        assert!(EvoError::Storage("locked".into()).is_retryable());
        assert!(EvoError::Busy("agent-1".into()).is_retryable());
        assert!(!EvoError::validation("bad").is_retryable());
        assert!(!EvoError::AgentNotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
        assert_eq!(
            serde_json::to_string(&ErrorCategory::TransientService).unwrap(),
            "\"transient_service\""
        );
    }
}
