//! Download of remote receipt images.

use std::future::Future;
use std::time::Duration;

use receiptly_core::config::FetchConfig;
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::error::FetchError;

pub struct ImageFetcher {
    client: Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ImageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("receiptly/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let bytes = retry_fixed(self.max_attempts, self.retry_delay, || self.fetch_once(parsed.clone())).await?;
        debug!(url, bytes = bytes.len(), "Fetched image");
        Ok(bytes)
    }

    async fn fetch_once(&self, url: Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Runs `operation` up to `max_attempts` times with a constant pause between
/// attempts. Non-retriable errors return immediately.
pub(crate) async fn retry_fixed<T, F, Fut>(max_attempts: u32, delay: Duration, mut operation: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() || attempt >= max_attempts {
                    return Err(err);
                }
                warn!(attempt, max_attempts, error = %err, "Image fetch failed; retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
