//! Limit check results and the per-request merged state.

use std::time::Duration;

use http::Extensions;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Result of consuming one unit from the quota backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCheckResult {
    /// Maximum units allowed in the current window.
    pub limit: u64,
    /// Units left after this consumption, as reported by the backend.
    pub remaining: i64,
    /// Epoch seconds at which the window resets.
    pub reset: u64,
    /// Whether the request is within the limit. The backend is authoritative here.
    pub conformant: bool,
}

/// Picks the most restrictive of two limit check results.
///
/// The result with the smaller `remaining` wins. On equal `remaining` the
/// `previous` result is kept, whatever either side's `conformant` flag says.
pub fn merge(current: Option<LimitCheckResult>, previous: Option<LimitCheckResult>) -> Option<LimitCheckResult> {
    match (current, previous) {
        (None, previous) => previous,
        (current, None) => current,
        (Some(current), Some(previous)) if current.remaining < previous.remaining => Some(current),
        (Some(_), previous) => previous,
    }
}

/// Rate limit state of a single request.
///
/// Lives in the request extensions while the interceptors run, and is copied
/// into the response extensions on the way out. It is never shared between
/// requests.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimitState {
    start: Instant,
    limit: Option<LimitCheckResult>,
}

impl RequestLimitState {
    /// A fresh state, started now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
        }
    }

    /// Time since the first interceptor started working on the request.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// The most restrictive result seen so far, if any quota was consumed.
    pub fn limit(&self) -> Option<LimitCheckResult> {
        self.limit
    }

    /// Merges `current` into the state and returns the new merged result.
    pub fn record(&mut self, current: LimitCheckResult) -> LimitCheckResult {
        let merged = merge(Some(current), self.limit).unwrap_or(current);
        self.limit = Some(merged);

        merged
    }

    /// Returns the state stored in `extensions`, creating it on first use.
    pub fn get_or_start(extensions: &mut Extensions) -> Self {
        match extensions.get::<Self>() {
            Some(state) => *state,
            None => {
                let state = Self::new();
                extensions.insert(state);
                state
            }
        }
    }
}

impl Default for RequestLimitState {
    fn default() -> Self {
        Self::new()
    }
}
