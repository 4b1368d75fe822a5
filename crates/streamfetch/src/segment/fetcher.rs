// HTTP segment fetcher: a single GET per segment with transport-level retry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::AcquireError;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::segment::SegmentFetch;

pub struct HttpSegmentFetcher {
    client: Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl HttpSegmentFetcher {
    pub fn new(client: Client, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            retry,
            timeout,
        }
    }

    /// One request. A request already sent is always read to completion, even
    /// if a sibling segment fails meanwhile.
    async fn fetch_once(&self, url: &str) -> Result<Bytes, AcquireError> {
        let mut request = self.client.get(url);
        if !self.timeout.is_zero() {
            request = request.timeout(self.timeout);
        }

        let started = Instant::now();
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::http_status(status, url, "segment download"));
        }

        let data = response.bytes().await?;
        trace!(
            url,
            bytes = data.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Segment response received"
        );
        Ok(data)
    }
}

#[async_trait]
impl SegmentFetch for HttpSegmentFetcher {
    async fn fetch(&self, url: &str, token: &CancellationToken) -> Result<Bytes, AcquireError> {
        retry_with_backoff(&self.retry, token, |attempt| async move {
            if attempt > 0 {
                debug!(url, attempt, "Retrying segment");
            }
            match self.fetch_once(url).await {
                Ok(data) => RetryAction::Success(data),
                Err(e) if e.is_retryable() => RetryAction::Retry(e),
                Err(e) => RetryAction::Fail(e),
            }
        })
        .await
    }
}
