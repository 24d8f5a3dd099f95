use crate::config::HttpConfig;
use crate::error::{AppError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Shared HTTP client for every outbound provider call.
///
/// The client carries the configured timeout, so a slow provider surfaces as
/// an `AppError::Http` timeout error rather than hanging the request.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Self::with_timeout(&http.user_agent, http.timeout())
    }

    pub fn with_timeout(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;

        Ok(serde_json::from_str(&body)?)
    }
}

/// Build a request URL from a configured base and query parameters,
/// percent-encoding the values.
pub fn build_url(base_url: &str, params: &[(&str, &str)]) -> Result<Url> {
    Url::parse_with_params(base_url, params)
        .map_err(|e| AppError::InvalidData(format!("Invalid provider URL '{}': {}", base_url, e)))
}
