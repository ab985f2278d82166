//! Shared HTTP session
//!
//! One [`HttpClient`] is built per run and cloned into every worker; clones
//! share reqwest's connection pool. Non-success statuses are turned into
//! tagged errors here, so callers and the retry loop never look at raw
//! status codes.

use crate::error::{Error, Result, error_for_status};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("papercast/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by all workers of a run
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// Build a client with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { inner })
    }

    /// The underlying reqwest client, for callers that build their own requests
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// GET `url` and return the body bytes
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.inner.get(url).send().await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// GET `url` and decode the body as JSON
    ///
    /// A body that does not decode is a [`Error::Serialization`], which the
    /// retry loop treats as permanent.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let bytes = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pass successful responses through; turn anything else into a tagged error
///
/// The body of a failed response is read (for the error message) and dropped,
/// which returns the connection to the pool.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status.as_u16(), body.trim(), retry_after))
}

/// Parse a `Retry-After` header given either as delta-seconds or an HTTP date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.signed_duration_since(chrono::Utc::now());
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
