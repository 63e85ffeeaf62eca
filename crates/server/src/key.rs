//! Key extractors available to file configured registrations.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use config::KeySource;
use http::{HeaderName, StatusCode, request::Parts};
use rate_limit::{HttpError, KeyExtractor};

/// Key extractor built from a `extract_key` configuration value.
#[derive(Debug, Clone)]
pub(crate) enum ConfiguredKey {
    /// The client IP address.
    ClientIp,
    /// The value of a request header.
    Header(HeaderName),
}

impl TryFrom<&KeySource> for ConfiguredKey {
    type Error = anyhow::Error;

    fn try_from(source: &KeySource) -> Result<Self, Self::Error> {
        match source {
            KeySource::ClientIp => Ok(Self::ClientIp),
            KeySource::HttpHeader(name) => {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid rate limit key header '{name}': {e}"))?;

                Ok(Self::Header(name))
            }
        }
    }
}

#[async_trait]
impl KeyExtractor for ConfiguredKey {
    async fn extract(&self, request: &Parts) -> Result<Option<String>, HttpError> {
        match self {
            ConfiguredKey::ClientIp => Ok(extract_client_ip(request).map(|ip| ip.to_string())),
            ConfiguredKey::Header(name) => {
                let Some(value) = request.headers.get(name) else {
                    return Ok(None);
                };

                let value = value
                    .to_str()
                    .map_err(|_| HttpError::new(StatusCode::BAD_REQUEST, format!("Invalid {name} header")))?;

                Ok(Some(value.to_string()))
            }
        }
    }
}

/// Extract client IP address from request.
///
/// Forwarding headers go first: behind a reverse proxy the peer address is
/// the proxy itself.
pub(crate) fn extract_client_ip(request: &Parts) -> Option<IpAddr> {
    // Take the first IP in the chain
    if let Some(forwarded_for) = request.headers.get("x-forwarded-for")
        && let Some(ip) = forwarded_for
            .to_str()
            .ok()
            .and_then(|value| value.split(',').next())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    if let Some(real_ip) = request.headers.get("x-real-ip")
        && let Some(ip) = real_ip.to_str().ok().and_then(|ip| ip.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    request
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip())
}
