//! Error types for rate limiting.

use std::fmt;

use http::{HeaderMap, StatusCode};

use crate::quota::QuotaError;

/// Boxed error returned by integrator supplied callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that happened while an interceptor handled a request.
///
/// These are reported to the completion hook. Only some of them turn into a
/// response, depending on the failure policy.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The bucket type resolver failed.
    #[error("cannot get bucket type: {0}")]
    BucketType(#[source] BoxError),

    /// The key extractor failed. Its error is sent as the response.
    #[error("cannot extract rate limit key: {0}")]
    KeyExtraction(HttpError),

    /// The registration has no quota client.
    #[error("quota client is not provided")]
    MissingQuotaClient,

    /// The quota backend failed.
    #[error(transparent)]
    Quota(#[from] QuotaError),
}

/// An error that is sent to the client as an HTTP response.
///
/// Error responses carry their own header map, so the rate limit headers of a
/// rejection travel with the error itself.
#[derive(Debug, Clone)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
}

impl HttpError {
    /// Creates an error with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
        }
    }

    /// A 500 error. The message is meant for logs, not for clients.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// A 429 error.
    pub fn too_many_requests() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
    }

    /// Replaces the headers of the error.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Status code of the response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Headers sent along with the error.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Splits the error into its parts.
    pub fn into_parts(self) -> (StatusCode, String, HeaderMap) {
        (self.status, self.message, self.headers)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}
