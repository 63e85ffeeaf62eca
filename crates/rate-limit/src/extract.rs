//! Integrator supplied parts of a registration: key extraction and bucket type resolution.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use http::request::Parts;

use crate::error::{BoxError, HttpError};

/// Derives the rate limit key of a request.
#[async_trait]
pub trait KeyExtractor: Send + Sync {
    /// Returns the key to consume quota for.
    ///
    /// `Ok(None)` skips rate limiting for this request. An error is sent back
    /// to the client as is.
    async fn extract(&self, request: &Parts) -> Result<Option<String>, HttpError>;
}

/// A [`KeyExtractor`] built from a synchronous function, see [`key_fn`].
#[derive(Clone)]
pub struct KeyFn<F>(F);

/// Wraps a function as a [`KeyExtractor`].
pub fn key_fn<F>(f: F) -> KeyFn<F>
where
    F: Fn(&Parts) -> Result<Option<String>, HttpError> + Send + Sync,
{
    KeyFn(f)
}

#[async_trait]
impl<F> KeyExtractor for KeyFn<F>
where
    F: Fn(&Parts) -> Result<Option<String>, HttpError> + Send + Sync,
{
    async fn extract(&self, request: &Parts) -> Result<Option<String>, HttpError> {
        (self.0)(request)
    }
}

/// Resolves the bucket type of a request at request time.
#[async_trait]
pub trait BucketTypeResolver: Send + Sync {
    /// Returns the bucket type to consume quota from.
    async fn resolve(&self, request: &Parts) -> Result<String, BoxError>;
}

/// A [`BucketTypeResolver`] built from a synchronous function, see [`bucket_type_fn`].
#[derive(Clone)]
pub struct BucketTypeFn<F>(F);

/// Wraps a function as a [`BucketTypeResolver`].
pub fn bucket_type_fn<F>(f: F) -> BucketTypeFn<F>
where
    F: Fn(&Parts) -> Result<String, BoxError> + Send + Sync,
{
    BucketTypeFn(f)
}

#[async_trait]
impl<F> BucketTypeResolver for BucketTypeFn<F>
where
    F: Fn(&Parts) -> Result<String, BoxError> + Send + Sync,
{
    async fn resolve(&self, request: &Parts) -> Result<String, BoxError> {
        (self.0)(request)
    }
}

/// The bucket type of a registration.
#[derive(Clone)]
pub enum BucketType {
    /// The same type for every request.
    Static(String),
    /// A type computed per request.
    Dynamic(Arc<dyn BucketTypeResolver>),
}

impl BucketType {
    /// A bucket type resolved per request by `resolver`.
    pub fn dynamic(resolver: impl BucketTypeResolver + 'static) -> Self {
        Self::Dynamic(Arc::new(resolver))
    }

    /// Resolves the type for `request`. Static types never fail.
    pub async fn resolve(&self, request: &Parts) -> Result<String, BoxError> {
        match self {
            BucketType::Static(bucket_type) => Ok(bucket_type.clone()),
            BucketType::Dynamic(resolver) => resolver.resolve(request).await,
        }
    }
}

impl fmt::Debug for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketType::Static(bucket_type) => f.debug_tuple("Static").field(bucket_type).finish(),
            BucketType::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

impl From<&str> for BucketType {
    fn from(bucket_type: &str) -> Self {
        Self::Static(bucket_type.to_string())
    }
}

impl From<String> for BucketType {
    fn from(bucket_type: String) -> Self {
        Self::Static(bucket_type)
    }
}
