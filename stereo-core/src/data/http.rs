//! Blocking HTTP fetcher.
//!
//! Plain GET requests with a fixed timeout. No retries: a failed request is
//! reported once and the loaders degrade to an empty result.

use super::provider::{FetchError, Fetcher};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("stereo-loader/", env!("CARGO_PKG_VERSION"));

/// `Fetcher` backed by a blocking reqwest client.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    fn get(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        debug!(url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(format!("{url}: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!(url, bytes = body.len(), "response");
        Ok(Some(body.to_vec()))
    }
}
