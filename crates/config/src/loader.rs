use std::{fmt::Write, path::Path};

use anyhow::bail;
use serde::Deserialize;
use toml::Value;

use crate::{Config, RateLimitOptions, ValidationError};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let raw_config: Value = toml::from_str(&content)?;

    validate_rate_limits(&raw_config)?;

    let config = Config::deserialize(raw_config)?;

    if config.rate_limits.is_empty() {
        log::warn!("No rate limits configured in {}, every request will be let through", path.display());
    }

    Ok(config)
}

/// Validates all `[[rate_limits]]` entries up front, so the error lists the
/// violations of every registration and not only the first broken one.
pub(crate) fn validate_rate_limits(raw_config: &Value) -> anyhow::Result<()> {
    let Some(entries) = raw_config.get("rate_limits") else {
        return Ok(());
    };

    let Some(entries) = entries.as_array() else {
        bail!(r#""rate_limits" must be an array of tables"#);
    };

    let mut errors = ValidationError::new();

    for (i, entry) in entries.iter().enumerate() {
        if let Err(err) = RateLimitOptions::from_value(entry) {
            errors.extend(err.prefixed(&format!("rate_limits[{i}]")));
        }
    }

    if errors.is_empty() {
        return Ok(());
    }

    let mut message = String::from("Invalid rate limit configuration:");

    for violation in errors.details() {
        write!(message, "\n  - {}: {}", violation.path, violation.message)?;
    }

    bail!(message)
}
