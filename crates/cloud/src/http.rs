//! HTTP client wrapper with Range request support and retry logic.

use crate::error::{CloudError, Result};
use futures::stream::{FuturesOrdered, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// First retry waits this long; each further retry doubles it.
const BASE_BACKOFF: Duration = Duration::from_millis(200);

/// HTTP client for fetching byte ranges from remote files.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

/// Response from a HEAD request.
#[derive(Debug, Clone, Copy)]
pub struct HeadInfo {
    /// Total file size in bytes, if reported by the server.
    pub content_length: Option<u64>,
    /// Whether the server advertises Range support.
    pub accept_ranges: bool,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    /// Send a HEAD request to discover file size and Range support.
    pub async fn head(&self, url: &str) -> Result<HeadInfo> {
        let resp = self.execute_with_retry(|| self.client.head(url), url).await?;

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        Ok(HeadInfo {
            content_length: header("content-length").and_then(|v| v.parse().ok()),
            accept_ranges: header("accept-ranges").is_some_and(|v| v.contains("bytes")),
        })
    }

    /// Fetch `[offset .. offset + length)` of a remote file.
    pub async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        let resp = self
            .execute_with_retry(|| self.client.get(url).header("Range", &range), url)
            .await?;

        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(CloudError::RangeNotSupported {
                url: url.to_string(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Fetch several `(offset, length)` ranges concurrently, results in
    /// request order.
    pub async fn fetch_ranges(&self, url: &str, ranges: &[(u64, u64)]) -> Result<Vec<Vec<u8>>> {
        let mut futs = FuturesOrdered::new();
        for &(offset, length) in ranges {
            futs.push_back(self.fetch_range(url, offset, length));
        }

        let mut results = Vec::with_capacity(ranges.len());
        while let Some(res) = futs.next().await {
            results.push(res?);
        }
        Ok(results)
    }

    /// GET a whole document as text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.execute_with_retry(|| self.client.get(url), url).await?;
        Ok(resp.text().await?)
    }

    /// POST a JSON body and return the response text
    pub async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<String> {
        let resp = self
            .execute_with_retry(|| self.client.post(url).json(body), url)
            .await?;
        Ok(resp.text().await?)
    }

    /// Send with exponential backoff on transient failures.
    ///
    /// Non-success statuses are turned into [`CloudError::Status`]; 429 and
    /// 5xx are retried, other statuses fail at once.
    async fn execute_with_retry<F>(&self, build: F, url: &str) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let outcome = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => CloudError::Status {
                    status: resp.status().as_u16(),
                    url: url.to_string(),
                },
                Err(e) => CloudError::Http(e),
            };

            if attempt >= self.max_retries || !outcome.is_transient() {
                return Err(outcome);
            }
            let delay = backoff(attempt);
            debug!(url, attempt, ?delay, error = %outcome, "retrying request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Delay before retry number `attempt` (0-based)
pub fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.saturating_pow(attempt.min(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff(0), Duration::from_millis(200));
        assert_eq!(backoff(1), Duration::from_millis(400));
        assert_eq!(backoff(3), Duration::from_millis(1600));
        assert_eq!(backoff(50), backoff(10));
    }
}
