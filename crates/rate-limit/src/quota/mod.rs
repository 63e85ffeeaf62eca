//! Clients for the quota backend.
//!
//! The backend owns the counting: a client only asks it to consume one unit
//! for a `(type, key)` pair and reports what it answered.

mod remote;

use async_trait::async_trait;

use crate::LimitCheckResult;

pub use remote::HttpQuotaClient;

/// Consumes quota units from the backend.
///
/// A client is shared by all concurrent requests and all registrations
/// pointing at the same backend. Implementations must not retry on their own
/// behalf; a failed call is reported as is.
#[async_trait]
pub trait QuotaClient: Send + Sync {
    /// Consumes one unit of the bucket `bucket_type` for `key`.
    async fn consume(&self, bucket_type: &str, key: &str) -> Result<LimitCheckResult, QuotaError>;
}

/// Errors that can occur while talking to the quota backend.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The request never got an answer (connection refused, timeout...).
    #[error("quota request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with an unexpected status.
    #[error("quota backend answered with status {0}")]
    Status(http::StatusCode),

    /// The backend address cannot be used.
    #[error("invalid quota backend address: {0}")]
    Address(#[from] url::ParseError),

    /// Any other backend failure.
    #[error("quota backend error: {0}")]
    Backend(String),
}
