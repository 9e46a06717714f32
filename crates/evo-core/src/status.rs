//! Agent status state machine
//!
//! Pure functions, no I/O. Allowed moves:
//! - `learning -> active` (performance review / manual promotion)
//! - any state `-> error` (repeated internal failures)
//! - `error -> learning` (manual reset)
//! - any state `-> inactive` (manual disable)
//! - `inactive -> learning` (re-enable; the agent re-earns `active`)
//!
//! Staying in the same state is always allowed. There is no terminal state.

use crate::types::AgentStatus;
use crate::{EvoError, Result};

/// Whether `from -> to` is a legal move
pub fn can_transition(from: AgentStatus, to: AgentStatus) -> bool {
    use AgentStatus::*;

    if from == to {
        return true;
    }

    matches!(
        (from, to),
        (Learning, Active) | (_, Error) | (Error, Learning) | (_, Inactive) | (Inactive, Learning)
    )
}

/// Validate a move, returning the new status
pub fn transition(from: AgentStatus, to: AgentStatus) -> Result<AgentStatus> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(EvoError::InvalidTransition(format!("{} -> {}", from, to)))
    }
}

/// Status after one more consecutive failure
pub fn after_failure(current: AgentStatus, failures: u32, threshold: u32) -> AgentStatus {
    if threshold > 0 && failures >= threshold {
        AgentStatus::Error
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AgentStatus::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(can_transition(Learning, Active));
        assert!(can_transition(Active, Error));
        assert!(can_transition(Learning, Error));
        assert!(can_transition(Error, Learning));
        assert!(can_transition(Active, Inactive));
        assert!(can_transition(Error, Inactive));
        assert!(can_transition(Inactive, Learning));
        assert!(can_transition(Active, Active));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!can_transition(Active, Learning));
        assert!(!can_transition(Error, Active));
        assert!(!can_transition(Inactive, Active));
    }

    #[test]
    fn test_transition_error() {
        let err = transition(Error, Active).unwrap_err();
        assert!(matches!(err, EvoError::InvalidTransition(ref m) if m == "error -> active"));
        assert_eq!(transition(Learning, Active).unwrap(), Active);
    }

    #[test]
    fn test_after_failure() {
        assert_eq!(after_failure(Active, 1, 3), Active);
        assert_eq!(after_failure(Active, 3, 3), Error);
        assert_eq!(after_failure(Learning, 10, 0), Learning);
    }
}
