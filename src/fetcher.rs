//! HTTP fetcher for downloading reputation feeds.

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{FeedFamily, FetchSettings, SourceFeed};
use crate::utils::{format_bytes, format_count};

/// Maximum size of a single feed (10 MB)
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;

/// Maximum total size for all downloads of a run (64 MB)
const MAX_TOTAL_SIZE: usize = 64 * 1024 * 1024;

/// Candidate entries extracted from one feed
#[derive(Debug)]
pub struct FetchResult {
    pub name: String,
    pub family: FeedFamily,
    pub candidates: Vec<String>,
    pub bytes: usize,
}

/// HTTP client for fetching feeds
pub struct Fetcher {
    client: Client,
    attempts: u32,
    retry_delay: Duration,
    max_workers: usize,
    max_feed_size: usize,
    max_total_size: usize,
    /// Cumulative download size tracker (shared by concurrent fetches)
    total_downloaded: AtomicUsize,
}

impl Fetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(format!("blocksmith/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            attempts: settings.attempts.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            max_workers: settings.max_workers.max(1),
            max_feed_size: MAX_FEED_SIZE,
            max_total_size: MAX_TOTAL_SIZE,
            total_downloaded: AtomicUsize::new(0),
        })
    }

    /// Override the download size limits.
    pub fn with_size_limits(mut self, per_feed: usize, total: usize) -> Self {
        self.max_feed_size = per_feed;
        self.max_total_size = total;
        self
    }

    /// Get the total bytes downloaded so far
    pub fn total_downloaded(&self) -> usize {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// Fetch one feed and run its extraction rule.
    ///
    /// An empty body or a body without a single candidate counts as a
    /// failure, the same as a transport error.
    pub async fn fetch_feed(&self, feed: &SourceFeed) -> Result<FetchResult> {
        debug!("Fetching {} from {}", feed.name, feed.url);

        let body = self
            .fetch_with_retry(&feed.url)
            .await
            .with_context(|| format!("Failed to fetch {}", feed.name))?;

        if body.trim().is_empty() {
            anyhow::bail!("{}: empty response body", feed.name);
        }

        let candidates = feed.extract.extract(&body);
        if candidates.is_empty() {
            anyhow::bail!("{}: no entries found in response", feed.name);
        }

        info!(
            "Fetched {} - {} candidates ({})",
            feed.name,
            format_count(candidates.len()),
            format_bytes(body.len() as u64)
        );

        Ok(FetchResult {
            name: feed.name.clone(),
            family: feed.family,
            candidates,
            bytes: body.len(),
        })
    }

    /// Fetch several feeds concurrently with limited parallelism.
    ///
    /// Results come back in the order of `feeds`, whatever order the
    /// downloads finish in.
    pub async fn fetch_feeds(&self, feeds: &[&SourceFeed]) -> Vec<Result<FetchResult>> {
        use futures::stream::{self, StreamExt};

        let mut results: Vec<(usize, Result<FetchResult>)> = stream::iter(
            feeds
                .iter()
                .enumerate()
                .map(|(idx, feed)| async move { (idx, self.fetch_feed(feed).await) }),
        )
        .buffer_unordered(self.max_workers)
        .collect()
        .await;

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Fetch content with retry logic and size validation
    ///
    /// Transport errors, non-2xx statuses and bodies cut short are retried;
    /// size limit violations are returned at once.
    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.attempts {
            if attempt > 0 {
                debug!(
                    "Retry {} after {}ms for {}",
                    attempt,
                    self.retry_delay.as_millis(),
                    url
                );
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(e.into());
                    continue;
                }
            };
            if !response.status().is_success() {
                last_error = Some(anyhow::anyhow!("HTTP {}", response.status()));
                continue;
            }
            if let Some(content_length) = response.content_length() {
                self.check_size(content_length as usize)?;
            }

            let body = match self.read_body(response).await? {
                Ok(body) => body,
                Err(e) => {
                    last_error = Some(anyhow::Error::new(e).context("Failed to read response body"));
                    continue;
                }
            };

            let new_total = self
                .total_downloaded
                .fetch_add(body.len(), Ordering::Relaxed)
                + body.len();
            if new_total > self.max_total_size {
                return Err(anyhow::anyhow!(
                    "Cumulative download limit exceeded: {} bytes (max: {} bytes)",
                    new_total,
                    self.max_total_size
                ));
            }

            return Ok(String::from_utf8_lossy(&body).into_owned());
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }

    /// Read the body chunk by chunk, stopping as soon as it outgrows the
    /// limits. The outer error is a size violation, the inner one a
    /// transport failure worth retrying.
    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> Result<std::result::Result<Vec<u8>, reqwest::Error>> {
        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    self.check_size(body.len() + chunk.len())?;
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => return Ok(Ok(body)),
                Err(e) => return Ok(Err(e)),
            }
        }
    }

    /// Size limits are not retried: the same URL will be just as large.
    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_feed_size {
            return Err(anyhow::anyhow!(
                "Response too large: {} bytes (max: {} bytes)",
                size,
                self.max_feed_size
            ));
        }
        let current_total = self.total_downloaded.load(Ordering::Relaxed);
        if current_total + size > self.max_total_size {
            return Err(anyhow::anyhow!(
                "Cumulative download limit exceeded: {} + {} > {} bytes",
                current_total,
                size,
                self.max_total_size
            ));
        }
        Ok(())
    }
}

// Note: Default is intentionally not implemented for Fetcher
// because new() can fail and we want explicit error handling.
