//! Tollgate server library.
//!
//! Provides a reusable server function to serve Tollgate either for the binary, or for the integration tests.
//!
//! Tollgate answers forward authentication subrequests: every request outside
//! of the health endpoint goes through the configured rate limits and is
//! answered with `204 No Content` when allowed.

#![deny(missing_docs)]

mod error;
mod health;
mod key;
mod pipeline;
mod rate_limit;
mod response_headers;

use std::net::SocketAddr;

use ::rate_limit::Interceptor;
use anyhow::anyhow;
use axum::{Router, routing::get};
use config::Config;
use http::StatusCode;
use tokio::net::TcpListener;

pub use pipeline::RateLimiting;
pub use response_headers::RateLimitHeadersLayer;

/// Configuration for serving Tollgate.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Tollgate TOML configuration.
    pub config: Config,
    /// Registrations built in code. They run after the ones of the
    /// configuration file within the same phase.
    pub interceptors: Vec<Interceptor>,
}

impl ServeConfig {
    /// Serve `config` on `listen_address`, with no registrations built in code.
    pub fn new(listen_address: SocketAddr, config: Config) -> Self {
        Self {
            listen_address,
            config,
            interceptors: Vec::new(),
        }
    }
}

/// Builds the application router: the health endpoint and the rate limited
/// forward authentication endpoint.
pub fn router(config: &Config, interceptors: Vec<Interceptor>) -> anyhow::Result<Router> {
    let mut rate_limiting = RateLimiting::from_config(&config.rate_limits)?;

    for interceptor in interceptors {
        rate_limiting.register(interceptor);
    }

    if rate_limiting.is_empty() {
        log::warn!("Server starting without rate limits, every request will be allowed.");
    } else {
        log::debug!("Applying {} rate limit registrations", rate_limiting.len());
    }

    let protected_router = rate_limiting.apply(Router::new().fallback(allow));

    let mut app = Router::new();

    // Health is not rate limited.
    if config.server.health.enabled && config.server.health.listen.is_none() {
        app = app.route(&config.server.health.path, get(health::health));
    }

    Ok(app.merge(protected_router))
}

/// Starts and runs the Tollgate server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        interceptors,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let app = router(&config, interceptors)?;

    if config.server.health.enabled
        && let Some(listen) = config.server.health.listen
    {
        let health_config = config.server.health.clone();

        tokio::spawn(async move {
            if let Err(e) = health::bind_health_endpoint(listen, health_config).await {
                log::error!("{e}");
            }
        });
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!("Rate limit endpoint available at: http://{listen_address}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    Ok(())
}

async fn allow() -> StatusCode {
    StatusCode::NO_CONTENT
}
