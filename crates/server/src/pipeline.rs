//! Ordering of rate limit registrations on a router.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use config::RateLimitOptions;
use rate_limit::{HttpQuotaClient, Interceptor, QuotaClient, QuotaFailurePolicy};
use url::Url;

use crate::{key::ConfiguredKey, rate_limit::RateLimitLayer, response_headers::RateLimitHeadersLayer};

/// All rate limit registrations of a server.
///
/// Interceptors run ordered by phase, and by registration order within a
/// phase. The header layer wraps all of them.
#[derive(Debug, Default, Clone)]
pub struct RateLimiting {
    interceptors: Vec<Arc<Interceptor>>,
}

impl RateLimiting {
    /// No registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registrations of the configuration file.
    ///
    /// Registrations pointing at the same backend with the same timeout
    /// share one quota client.
    pub fn from_config(registrations: &[RateLimitOptions]) -> anyhow::Result<Self> {
        let mut clients: HashMap<(Url, Option<Duration>), Arc<dyn QuotaClient>> = HashMap::new();
        let mut rate_limiting = Self::new();

        for (index, options) in registrations.iter().enumerate() {
            let client = match clients.get(&(options.address.clone(), options.timeout)) {
                Some(client) => client.clone(),
                None => {
                    let client: Arc<dyn QuotaClient> = Arc::new(
                        HttpQuotaClient::new(&options.address, options.timeout)
                            .with_context(|| format!("Failed to create quota client for {}", options.address))?,
                    );

                    clients.insert((options.address.clone(), options.timeout), client.clone());
                    client
                }
            };

            let interceptor = Interceptor::builder()
                .event(options.event)
                .bucket_type(options.bucket_type.as_str())
                .quota_client(client)
                .extract_key(ConfiguredKey::try_from(&options.extract_key)?)
                .on_error(QuotaFailurePolicy::from(options.on_error))
                .build()
                .with_context(|| format!("Invalid rate limit registration rate_limits[{index}]"))?;

            log::debug!(
                "Registered rate limit '{}' in {} against {}",
                options.bucket_type,
                options.event,
                options.address
            );

            rate_limiting.register(interceptor);
        }

        Ok(rate_limiting)
    }

    /// Adds a registration.
    pub fn register(&mut self, interceptor: Interceptor) {
        self.interceptors.push(Arc::new(interceptor));
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Wraps every route of `router` with the registrations.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let mut interceptors = self.interceptors;

        // Stable, so registration order holds within a phase.
        interceptors.sort_by_key(|interceptor| interceptor.phase());

        // The last layer added runs first.
        let router = interceptors
            .into_iter()
            .rev()
            .fold(router, |router, interceptor| router.layer(RateLimitLayer::new(interceptor)));

        router.layer(RateLimitHeadersLayer)
    }
}
