//! Rate limiting core for Tollgate.
//!
//! Counting is delegated to an external quota backend. This crate decides
//! what to do with its answers:
//! - one [`Interceptor`] per registration extracts a key, consumes a unit and
//!   accepts or rejects the request
//! - answers of every registration that ran for a request are merged into a
//!   single [`RequestLimitState`], keeping the most restrictive one
//! - the merged state is rendered as `x-ratelimit-*` headers
//!
//! The crate knows nothing about the host server: it works on
//! [`http::request::Parts`] and leaves response rendering to the caller.

#![deny(missing_docs)]

mod error;
mod extract;
mod headers;
mod hooks;
mod interceptor;
mod limit;
pub mod quota;

pub use error::{BoxError, HttpError, RateLimitError};
pub use extract::{BucketType, BucketTypeFn, BucketTypeResolver, KeyExtractor, KeyFn, bucket_type_fn, key_fn};
pub use headers::{RateLimitHeaders, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
pub use hooks::{Completion, Decision, OnFinished, QuotaFailurePolicy};
pub use interceptor::{Interceptor, InterceptorBuilder};
pub use limit::{LimitCheckResult, RequestLimitState, merge};
pub use quota::{HttpQuotaClient, QuotaClient, QuotaError};
