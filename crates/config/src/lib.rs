//! Tollgate configuration structures to map the tollgate.toml configuration.

#![deny(missing_docs)]

mod health;
mod loader;
mod rate_limit;
mod server;
mod validation;

use std::path::Path;

pub use health::HealthConfig;
pub use rate_limit::{KeySource, OnQuotaError, Phase, RateLimitOptions};
use serde::Deserialize;
pub use server::ServerConfig;
pub use validation::{ValidationError, Violation};

/// Main configuration structure for the Tollgate application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limit registrations, in registration order.
    #[serde(default)]
    pub rate_limits: Vec<RateLimitOptions>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }
}
