//! JSON over HTTP quota client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::{QuotaClient, QuotaError};
use crate::LimitCheckResult;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct TakeRequest<'a> {
    #[serde(rename = "type")]
    bucket_type: &'a str,
    key: &'a str,
    count: u32,
}

/// Quota client talking to a backend over HTTP.
///
/// Consuming a unit is a `POST {address}/take` with `{"type", "key", "count"}`;
/// the backend answers with `{"limit", "remaining", "reset", "conformant"}`.
#[derive(Debug, Clone)]
pub struct HttpQuotaClient {
    client: reqwest::Client,
    take_url: Url,
}

impl HttpQuotaClient {
    /// Creates a client for the backend at `address`. Requests time out after
    /// `timeout`, one second by default.
    pub fn new(address: &Url, timeout: Option<Duration>) -> Result<Self, QuotaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        let mut base = address.clone();

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            take_url: base.join("take")?,
        })
    }

    /// The URL units are consumed from.
    pub fn take_url(&self) -> &Url {
        &self.take_url
    }
}

#[async_trait]
impl QuotaClient for HttpQuotaClient {
    async fn consume(&self, bucket_type: &str, key: &str) -> Result<LimitCheckResult, QuotaError> {
        let request = TakeRequest {
            bucket_type,
            key,
            count: 1,
        };

        let response = self.client.post(self.take_url.clone()).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            log::debug!("Quota backend at {} answered with status {status}", self.take_url);
            return Err(QuotaError::Status(status));
        }

        Ok(response.json().await?)
    }
}
