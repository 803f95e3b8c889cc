//! Sequential crawl of the closed-auctions listing.
//!
//! One detail URL is handled end to end (fetch, extract, normalize, persist)
//! before the next one starts, with a fixed pause between requests. Per-page
//! failures are logged and counted; only a listing failure aborts the run.

use std::time::Duration;

use kvd_core::{AppConfig, AuctionSink, PersistOutcome};
use serde::Serialize;

use crate::client::PageFetcher;
use crate::error::ScraperError;
use crate::html::detail_links;
use crate::page::{scrape_detail_page, PageMiss};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Origin prepended to relative detail links.
    pub base_url: String,
    pub listing_url: String,
    pub inter_request_delay: Duration,
    pub retry: RetryPolicy,
    pub lenient_json: bool,
}

impl CrawlOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            listing_url: config.listing_url(),
            inter_request_delay: Duration::from_millis(config.scraper_inter_request_delay_ms),
            retry: RetryPolicy::new(
                config.scraper_max_retries,
                Duration::from_secs(config.scraper_retry_backoff_base_secs),
            ),
            lenient_json: config.scraper_lenient_json,
        }
    }
}

/// 1-based, inclusive slice of the discovered detail URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlRange {
    start: Option<usize>,
    end: Option<usize>,
}

impl CrawlRange {
    /// Every discovered URL.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidRange`] if either bound is zero or
    /// `start > end`.
    pub fn new(start: Option<usize>, end: Option<usize>) -> Result<Self, ScraperError> {
        if start == Some(0) || end == Some(0) {
            return Err(ScraperError::InvalidRange {
                reason: "bounds are 1-based".to_string(),
            });
        }
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ScraperError::InvalidRange {
                    reason: format!("start {s} is greater than end {e}"),
                });
            }
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> Option<usize> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Option<usize> {
        self.end
    }

    /// Applies the range, clamping both bounds to `items`.
    #[must_use]
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.start.unwrap_or(1).max(1);
        let end = self.end.unwrap_or(items.len()).min(items.len());
        if start > end {
            return &[];
        }
        &items[start - 1..end]
    }
}

/// What happened to one detail URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Persisted(PersistOutcome),
    Redirected { location: Option<String> },
    Missed(PageMiss),
    FetchFailed,
    StoreFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub processed_urls: usize,
    pub persisted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CrawlSummary {
    fn record(&mut self, outcome: &PageOutcome) {
        self.processed_urls += 1;
        match outcome {
            PageOutcome::Persisted(PersistOutcome::Inserted | PersistOutcome::Updated) => {
                self.persisted += 1;
            }
            PageOutcome::Persisted(PersistOutcome::Skipped)
            | PageOutcome::Redirected { .. }
            | PageOutcome::Missed(_) => self.skipped += 1,
            PageOutcome::FetchFailed | PageOutcome::StoreFailed => self.failed += 1,
        }
    }
}

pub struct Crawler<F, S> {
    fetcher: F,
    sink: S,
    options: CrawlOptions,
}

impl<F, S> Crawler<F, S>
where
    F: PageFetcher + Sync,
    S: AuctionSink + Sync,
{
    pub fn new(fetcher: F, sink: S, options: CrawlOptions) -> Self {
        Self {
            fetcher,
            sink,
            options,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Fetches the listing page and returns its detail URLs.
    ///
    /// # Errors
    ///
    /// Returns the fetch error once retries are exhausted.
    pub async fn discover_urls(&self) -> Result<Vec<String>, ScraperError> {
        let listing_url = self.options.listing_url.as_str();
        let page = self
            .options
            .retry
            .run(|| self.fetcher.fetch(listing_url, true))
            .await?;
        let urls = detail_links(&page.body, &self.options.base_url);
        tracing::info!(listing_url, count = urls.len(), "discovered detail urls");
        Ok(urls)
    }

    /// Crawls the selected slice of detail URLs.
    ///
    /// # Errors
    ///
    /// Only a listing page failure is an error; per-page problems are counted
    /// in the returned [`CrawlSummary`].
    pub async fn run(&self, range: CrawlRange) -> Result<CrawlSummary, ScraperError> {
        let urls = self.discover_urls().await?;
        let selected = range.slice(&urls);
        tracing::info!(
            total = urls.len(),
            selected = selected.len(),
            start = range.start(),
            end = range.end(),
            "starting crawl"
        );

        let mut summary = CrawlSummary::default();
        for (i, url) in selected.iter().enumerate() {
            if i > 0 && !self.options.inter_request_delay.is_zero() {
                tokio::time::sleep(self.options.inter_request_delay).await;
            }
            let outcome = self.process_url(url).await;
            summary.record(&outcome);
        }

        tracing::info!(
            processed_urls = summary.processed_urls,
            persisted = summary.persisted,
            skipped = summary.skipped,
            failed = summary.failed,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Fetches, parses, and persists one detail page.
    ///
    /// A redirect ends processing before any parsing happens.
    pub async fn process_url(&self, url: &str) -> PageOutcome {
        tracing::info!(url, "fetching detail page");
        let page = match self
            .options
            .retry
            .run(|| self.fetcher.fetch(url, false))
            .await
        {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(url, error = %e, "giving up on detail page");
                return PageOutcome::FetchFailed;
            }
        };

        if page.is_redirect() {
            tracing::warn!(
                url,
                location = page.location.as_deref().unwrap_or("unknown"),
                "detail page redirects, skipping"
            );
            return PageOutcome::Redirected {
                location: page.location,
            };
        }

        let record = match scrape_detail_page(&page.body, self.options.lenient_json) {
            Ok(record) => record,
            Err(miss) => {
                tracing::warn!(url, reason = miss.as_str(), "no auction data on detail page");
                return PageOutcome::Missed(miss);
            }
        };
        if record.main_image_url.is_none() {
            tracing::warn!(url, "no image url found");
        }

        let auction_id = record.auction_id.clone().unwrap_or_default();
        match self.sink.persist(&record).await {
            Ok(outcome) => {
                tracing::info!(url, auction_id, outcome = outcome.as_str(), "auction handled");
                PageOutcome::Persisted(outcome)
            }
            Err(e) => {
                tracing::error!(url, auction_id, error = %e, "failed to persist auction");
                PageOutcome::StoreFailed
            }
        }
    }
}

#[cfg(test)]
#[path = "crawl_test.rs"]
mod tests;
