//! Standard rate limit response headers.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::LimitCheckResult;

/// Maximum units allowed in the current window.
pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Units left in the current window.
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Epoch seconds at which the window resets.
pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// The header set describing a limit. Values are passed through as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    limit: u64,
    remaining: i64,
    reset: u64,
}

impl RateLimitHeaders {
    /// Builds the header set for a limit.
    pub fn format(limit: u64, remaining: i64, reset: u64) -> Self {
        Self { limit, remaining, reset }
    }

    /// Header names paired with their values.
    pub fn entries(&self) -> [(HeaderName, HeaderValue); 3] {
        [
            (X_RATELIMIT_LIMIT.clone(), HeaderValue::from(self.limit)),
            (X_RATELIMIT_REMAINING.clone(), HeaderValue::from(self.remaining)),
            (X_RATELIMIT_RESET.clone(), HeaderValue::from(self.reset)),
        ]
    }

    /// Writes the headers into `headers`, replacing previous values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in self.entries() {
            headers.insert(name, value);
        }
    }

    /// A new header map containing only the rate limit headers.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(3);
        self.apply(&mut headers);

        headers
    }
}

impl From<LimitCheckResult> for RateLimitHeaders {
    fn from(result: LimitCheckResult) -> Self {
        Self::format(result.limit, result.remaining, result.reset)
    }
}
