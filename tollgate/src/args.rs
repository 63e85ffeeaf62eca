use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use config::Config;
use log::LevelFilter;

/// Read when `--config` is not given, if it exists.
const DEFAULT_CONFIG_PATH: &str = "./tollgate.toml";

const DEFAULT_LISTEN_ADDRESS: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000);

/// Forward-auth rate limiting backed by a quota service.
///
/// Every request other than the health check is answered with 204 when all
/// configured limits allow it, and with 429 otherwise.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
pub(crate) struct Args {
    /// Address to listen on. Overrides `server.listen_address`; 127.0.0.1:8000 when neither is set
    #[arg(short, long, env = "TOLLGATE_LISTEN_ADDRESS")]
    listen_address: Option<SocketAddr>,
    /// Rate limit configuration file. Must exist when given; ./tollgate.toml is used if present otherwise
    #[arg(short, long, env = "TOLLGATE_CONFIG_PATH")]
    config: Option<PathBuf>,
    /// Log level of tollgate itself. Dependencies only log warnings
    #[arg(long = "log", env = "TOLLGATE_LOG", default_value_t = LevelFilter::Info)]
    pub(crate) log_level: LevelFilter,
    /// Shape of the log lines. Text is colored when stdout is a terminal
    #[arg(long, env = "TOLLGATE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub(crate) log_format: LogFormat,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

impl Args {
    /// Loads the rate limit registrations.
    pub(crate) fn config(&self) -> anyhow::Result<Config> {
        let path = match &self.config {
            Some(path) => path.as_path(),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
            None => {
                log::warn!("No --config given and no {DEFAULT_CONFIG_PATH} found, every request will be let through");
                return Ok(Config::default());
            }
        };

        let config = Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?;

        log::info!(
            "Loaded {} rate limit registration(s) from {}",
            config.rate_limits.len(),
            path.display()
        );

        Ok(config)
    }

    /// The command line wins over the file.
    pub(crate) fn listen_address(&self, config: &Config) -> SocketAddr {
        self.listen_address
            .or(config.server.listen_address)
            .unwrap_or(DEFAULT_LISTEN_ADDRESS)
    }
}
