pub mod client;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod html;
pub mod mapper;
pub mod normalize;
pub mod page;
pub mod retry;

pub use client::{FetchedPage, KvdClient, PageFetcher};
pub use crawl::{CrawlOptions, CrawlRange, CrawlSummary, Crawler, PageOutcome};
pub use error::ScraperError;
pub use mapper::{map_fields, RawAuctionFields};
pub use normalize::normalize_auction;
pub use page::{record_from_object_view, scrape_detail_page, PageMiss};
pub use retry::RetryPolicy;
