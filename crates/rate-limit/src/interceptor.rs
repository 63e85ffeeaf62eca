//! The per-registration rate limit check.

use std::{fmt, sync::Arc, time::Duration};

use config::{Phase, ValidationError};
use http::request::Parts;

use crate::{
    error::{HttpError, RateLimitError},
    extract::{BucketType, KeyExtractor},
    headers::RateLimitHeaders,
    hooks::{Completion, Decision, OnFinished, QuotaFailurePolicy},
    limit::RequestLimitState,
    quota::QuotaClient,
};

/// One rate limit registration, ready to run against requests.
///
/// An interceptor extracts a key from the request, consumes a unit of quota
/// for it and merges the answer into the [`RequestLimitState`] kept in the
/// request extensions. Several interceptors can run for the same request;
/// the state always holds the most restrictive answer.
#[derive(Clone)]
pub struct Interceptor {
    phase: Phase,
    bucket_type: BucketType,
    quota_client: Option<Arc<dyn QuotaClient>>,
    key_extractor: Arc<dyn KeyExtractor>,
    on_error: QuotaFailurePolicy,
    on_finished: Option<OnFinished>,
}

impl Interceptor {
    /// Starts building an interceptor.
    pub fn builder() -> InterceptorBuilder {
        InterceptorBuilder::default()
    }

    /// The phase this interceptor runs in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The client consuming quota for this registration, if any.
    pub fn quota_client(&self) -> Option<&Arc<dyn QuotaClient>> {
        self.quota_client.as_ref()
    }

    /// Checks the request against the registration.
    ///
    /// The merged state is written back into `request.extensions` and
    /// decides the outcome: the request goes on while the most restrictive
    /// answer so far is conformant. A rejection carries its headers.
    pub async fn intercept(&self, request: &mut Parts) -> Decision {
        let bucket_type = match self.bucket_type.resolve(request).await {
            Ok(bucket_type) => bucket_type,
            Err(error) => {
                log::error!("Failed to resolve the rate limit bucket type: {error}");

                let elapsed = request
                    .extensions
                    .get::<RequestLimitState>()
                    .map(RequestLimitState::elapsed)
                    .unwrap_or_default();

                let error = RateLimitError::BucketType(error);
                self.finish(Some(&error), request, elapsed, Completion::failed());

                return Decision::Reject(HttpError::internal("cannot get bucket type"));
            }
        };

        let mut state = RequestLimitState::get_or_start(&mut request.extensions);

        let key = match self.key_extractor.extract(request).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                log::debug!("No rate limit key for bucket '{bucket_type}', skipping the check");
                self.finish(None, request, state.elapsed(), Completion::passed());

                return Decision::Continue;
            }
            Err(error) => {
                log::debug!("Rate limit key extraction failed for bucket '{bucket_type}': {error}");

                let rejection = error.clone();
                let error = RateLimitError::KeyExtraction(error);
                self.finish(Some(&error), request, state.elapsed(), Completion::failed());

                return Decision::Reject(rejection);
            }
        };

        let Some(quota_client) = &self.quota_client else {
            log::warn!("No quota client configured for bucket '{bucket_type}', letting the request through");

            let error = RateLimitError::MissingQuotaClient;
            self.finish(Some(&error), request, state.elapsed(), Completion::failed());

            return Decision::Continue;
        };

        let current = match quota_client.consume(&bucket_type, &key).await {
            Ok(current) => current,
            Err(error) => {
                log::warn!("Quota backend failed for bucket '{bucket_type}': {error}");

                let decision = self.on_error.decide(&error);
                let error = RateLimitError::Quota(error);
                self.finish(Some(&error), request, state.elapsed(), Completion::failed());

                return decision;
            }
        };

        let merged = state.record(current);
        request.extensions.insert(state);

        if merged.conformant {
            self.finish(None, request, state.elapsed(), Completion::passed());

            return Decision::Continue;
        }

        log::debug!("Rate limit exceeded for key '{key}' in bucket '{bucket_type}'");
        self.finish(None, request, state.elapsed(), Completion::rate_limited());

        let headers = RateLimitHeaders::from(merged).to_header_map();

        Decision::Reject(HttpError::too_many_requests().with_headers(headers))
    }

    fn finish(&self, error: Option<&RateLimitError>, request: &Parts, elapsed: Duration, completion: Completion) {
        if let Some(on_finished) = &self.on_finished {
            on_finished(error, request, elapsed, completion);
        }
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("phase", &self.phase)
            .field("bucket_type", &self.bucket_type)
            .field("quota_client", &self.quota_client.is_some())
            .field("on_error", &self.on_error)
            .field("on_finished", &self.on_finished.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Interceptor`].
///
/// The phase, the bucket type and the key extractor are required. All
/// missing values are reported together by [`InterceptorBuilder::build`].
#[derive(Default)]
pub struct InterceptorBuilder {
    phase: Option<Phase>,
    bucket_type: Option<BucketType>,
    quota_client: Option<Arc<dyn QuotaClient>>,
    key_extractor: Option<Arc<dyn KeyExtractor>>,
    on_error: QuotaFailurePolicy,
    on_finished: Option<OnFinished>,
}

impl InterceptorBuilder {
    /// Sets the phase the interceptor runs in.
    pub fn event(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets the bucket type, a static name or a resolver.
    pub fn bucket_type(mut self, bucket_type: impl Into<BucketType>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    /// Sets the client used to consume quota.
    pub fn quota_client(mut self, client: Arc<dyn QuotaClient>) -> Self {
        self.quota_client = Some(client);
        self
    }

    /// Sets how the rate limit key is derived from a request.
    pub fn extract_key(mut self, extractor: impl KeyExtractor + 'static) -> Self {
        self.key_extractor = Some(Arc::new(extractor));
        self
    }

    /// Sets the reaction to quota backend failures. Fails open by default.
    pub fn on_error(mut self, policy: impl Into<QuotaFailurePolicy>) -> Self {
        self.on_error = policy.into();
        self
    }

    /// Sets the completion hook.
    pub fn on_finished<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&RateLimitError>, &Parts, Duration, Completion) + Send + Sync + 'static,
    {
        self.on_finished = Some(Arc::new(hook));
        self
    }

    /// Validates the registration and builds the interceptor.
    pub fn build(self) -> Result<Interceptor, ValidationError> {
        let mut errors = ValidationError::new();

        if self.phase.is_none() {
            errors.required("event");
        }

        match &self.bucket_type {
            None => errors.required("type"),
            Some(BucketType::Static(bucket_type)) if bucket_type.is_empty() => {
                errors.push("type", "\"type\" is not allowed to be empty");
            }
            Some(_) => (),
        }

        if self.key_extractor.is_none() {
            errors.required("extract_key");
        }

        match (self.phase, self.bucket_type, self.key_extractor) {
            (Some(phase), Some(bucket_type), Some(key_extractor)) if errors.is_empty() => Ok(Interceptor {
                phase,
                bucket_type,
                quota_client: self.quota_client,
                key_extractor,
                on_error: self.on_error,
                on_finished: self.on_finished,
            }),
            _ => Err(errors),
        }
    }
}
