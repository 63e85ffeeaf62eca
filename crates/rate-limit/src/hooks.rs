//! Failure policy and completion hook of a registration.

use std::{fmt, sync::Arc, time::Duration};

use config::OnQuotaError;
use http::request::Parts;

use crate::{
    error::{HttpError, RateLimitError},
    quota::QuotaError,
};

/// What the host pipeline should do with a request after an interceptor ran.
#[derive(Debug)]
pub enum Decision {
    /// Continue with the next phase.
    Continue,
    /// Stop processing and answer with this error.
    Reject(HttpError),
}

type QuotaErrorHandler = Arc<dyn Fn(&QuotaError) -> Decision + Send + Sync>;

/// How an interceptor reacts when the quota backend fails.
#[derive(Clone, Default)]
pub enum QuotaFailurePolicy {
    /// Let the request through. A limiter outage never blocks traffic.
    #[default]
    FailOpen,
    /// Answer with an internal server error.
    FailClosed,
    /// Let the handler decide.
    Handler(QuotaErrorHandler),
}

impl QuotaFailurePolicy {
    /// A policy delegating the decision to `handler`.
    pub fn handler<F>(handler: F) -> Self
    where
        F: Fn(&QuotaError) -> Decision + Send + Sync + 'static,
    {
        Self::Handler(Arc::new(handler))
    }

    pub(crate) fn decide(&self, error: &QuotaError) -> Decision {
        match self {
            QuotaFailurePolicy::FailOpen => Decision::Continue,
            QuotaFailurePolicy::FailClosed => Decision::Reject(HttpError::internal(error.to_string())),
            QuotaFailurePolicy::Handler(handler) => handler(error),
        }
    }
}

impl fmt::Debug for QuotaFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaFailurePolicy::FailOpen => f.write_str("FailOpen"),
            QuotaFailurePolicy::FailClosed => f.write_str("FailClosed"),
            QuotaFailurePolicy::Handler(_) => f.write_str("Handler"),
        }
    }
}

impl From<OnQuotaError> for QuotaFailurePolicy {
    fn from(on_error: OnQuotaError) -> Self {
        match on_error {
            OnQuotaError::Continue => Self::FailOpen,
            OnQuotaError::Reject => Self::FailClosed,
        }
    }
}

/// Outcome of one interceptor invocation, as reported to the completion hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    /// The request was rejected for exceeding a limit.
    pub rate_limited: bool,
    /// Something failed while checking the limit.
    pub error: bool,
}

impl Completion {
    pub(crate) fn passed() -> Self {
        Self::default()
    }

    pub(crate) fn failed() -> Self {
        Self {
            rate_limited: false,
            error: true,
        }
    }

    pub(crate) fn rate_limited() -> Self {
        Self {
            rate_limited: true,
            error: false,
        }
    }
}

/// Called exactly once per interceptor invocation with the error (if any),
/// the request, the time elapsed since the request state was created and the
/// outcome.
pub type OnFinished = Arc<dyn Fn(Option<&RateLimitError>, &Parts, Duration, Completion) + Send + Sync>;

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    #[test]
    fn fail_open_continues() {
        let decision = QuotaFailurePolicy::default().decide(&QuotaError::Backend("down".into()));

        assert!(matches!(decision, Decision::Continue));
    }

    #[test]
    fn fail_closed_rejects_with_internal_error() {
        let decision = QuotaFailurePolicy::FailClosed.decide(&QuotaError::Backend("down".into()));

        let Decision::Reject(error) = decision else {
            unreachable!("expected a rejection");
        };

        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message(), "quota backend error: down");
    }

    #[test]
    fn handler_owns_the_decision() {
        let policy = QuotaFailurePolicy::handler(|_| Decision::Reject(HttpError::new(StatusCode::BAD_GATEWAY, "no limiter")));

        let Decision::Reject(error) = policy.decide(&QuotaError::Backend("down".into())) else {
            unreachable!("expected a rejection");
        };

        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn config_values_map_to_policies() {
        assert!(matches!(
            QuotaFailurePolicy::from(OnQuotaError::Continue),
            QuotaFailurePolicy::FailOpen
        ));
        assert!(matches!(
            QuotaFailurePolicy::from(OnQuotaError::Reject),
            QuotaFailurePolicy::FailClosed
        ));
    }
}
