//! Fail-open utilities for graceful degradation
//!
//! Use these for bookkeeping that must never fail the caller's request:
//! ecosystem snapshot refreshes, failure counters, outcome feedback for agents
//! that may already be gone.
//!
//! DO NOT use fail-open for:
//! - Recording the raw change event
//! - Agent creation
//! - Validation

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use evo_core::fail_open::fail_open;
/// use evo_core::Result;
///
/// async fn refresh_snapshot() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let refreshed = fail_open("ecosystem_refresh", || refresh_snapshot()).await;
///     // refreshed is None if the refresh failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
