//! HTTP plumbing shared by the network-backed adapters

use crate::error::ProviderError;
use reqwest::{Client, Response};
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("agent-data/", env!("CARGO_PKG_VERSION"));

/// Browser-like agent for endpoints that reject unknown clients
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!("Falling back to default HTTP client: {}", err);
            Client::new()
        })
}

/// Pass through successful responses, classify the rest
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, &body))
}

/// Like [`check_status`] for endpoints without an API key, where 401/403 is a block rather than a bad key
pub(crate) async fn check_keyless_status(response: Response) -> Result<Response, ProviderError> {
    check_status(response).await.map_err(ProviderError::keyless)
}
