//! One crawl at a time, whoever triggers it.

use kvd_db::PgAuctionStore;
use kvd_scraper::{CrawlOptions, CrawlRange, CrawlSummary, Crawler, KvdClient, ScraperError};
use thiserror::Error;

use crate::api::AppState;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("a crawl is already running")]
    Busy,
    #[error(transparent)]
    Scraper(#[from] ScraperError),
}

/// Runs a full crawl against the configured site and persists into the pool.
///
/// Holds the state's crawl lock for the whole run; a second caller gets
/// [`CrawlError::Busy`] immediately instead of queueing.
///
/// # Errors
///
/// Returns [`CrawlError::Busy`] if another crawl holds the lock, or
/// [`CrawlError::Scraper`] if the client cannot be built or the listing
/// page cannot be fetched.
pub async fn run_crawl(state: &AppState, range: CrawlRange) -> Result<CrawlSummary, CrawlError> {
    let Ok(_guard) = state.crawl_lock.try_lock() else {
        return Err(CrawlError::Busy);
    };

    let config = &state.config;
    let client = KvdClient::new(
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
    )?;
    let crawler = Crawler::new(
        client,
        PgAuctionStore::new(state.pool.clone()),
        CrawlOptions::from_config(config),
    );
    Ok(crawler.run(range).await?)
}
