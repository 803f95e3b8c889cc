use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use kvd_core::AuctionRecord;

use super::*;
use crate::client::FetchedPage;

const BASE: &str = "https://www.kvd.se";
const LISTING: &str = "https://www.kvd.se/stangda-auktioner";

#[derive(Clone)]
enum Reply {
    Page(u16, String, Option<String>),
    Status(u16),
}

#[derive(Default)]
struct FakeFetcher {
    replies: HashMap<String, Reply>,
    calls: Arc<AtomicU32>,
}

impl FakeFetcher {
    fn with(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_owned(), reply);
        self
    }
}

impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _follow_redirects: bool) -> Result<FetchedPage, ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(url).cloned() {
            Some(Reply::Page(status, body, location)) => Ok(FetchedPage {
                status,
                body,
                location,
            }),
            Some(Reply::Status(status)) => Err(ScraperError::UnexpectedStatus {
                status,
                url: url.to_owned(),
            }),
            None => Err(ScraperError::UnexpectedStatus {
                status: 404,
                url: url.to_owned(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<AuctionRecord>>,
    fail: bool,
}

impl AuctionSink for RecordingSink {
    type Error = String;

    async fn persist(&self, record: &AuctionRecord) -> Result<PersistOutcome, String> {
        if self.fail {
            return Err("database unavailable".to_owned());
        }
        if record.persistable_id().is_none() {
            return Ok(PersistOutcome::Skipped);
        }
        self.records
            .lock()
            .map_err(|e| e.to_string())?
            .push(record.clone());
        Ok(PersistOutcome::Inserted)
    }
}

fn options() -> CrawlOptions {
    CrawlOptions {
        base_url: BASE.to_owned(),
        listing_url: LISTING.to_owned(),
        inter_request_delay: Duration::ZERO,
        retry: RetryPolicy::new(0, Duration::ZERO),
        lenient_json: true,
    }
}

fn listing(paths: &[&str]) -> String {
    paths
        .iter()
        .map(|p| format!(r#"<a href="{p}">car</a>"#))
        .collect::<Vec<_>>()
        .join("\n")
}

fn detail(auction_url: &str) -> String {
    format!(
        r#"<script>window.s = {{"objectView":{{"storeObjects":{{"k":{{"auctionUrl":"{auction_url}","soldFor":100000,"processObject":{{"baseObject":{{"modelName":"XC40 78 kWh"}},"properties":{{"brand":"Volvo"}}}}}}}}}}}};</script>"#
    )
}

fn ok(body: String) -> Reply {
    Reply::Page(200, body, None)
}

// -----------------------------------------------------------------------
// CrawlRange
// -----------------------------------------------------------------------

#[test]
fn range_rejects_zero_and_inverted_bounds() {
    assert!(matches!(
        CrawlRange::new(Some(0), None),
        Err(ScraperError::InvalidRange { .. })
    ));
    assert!(matches!(
        CrawlRange::new(None, Some(0)),
        Err(ScraperError::InvalidRange { .. })
    ));
    assert!(matches!(
        CrawlRange::new(Some(3), Some(2)),
        Err(ScraperError::InvalidRange { .. })
    ));
}

#[test]
fn range_is_one_based_inclusive_and_clamped() {
    let items = [1, 2, 3, 4, 5];
    assert_eq!(CrawlRange::all().slice(&items), &[1, 2, 3, 4, 5]);
    assert_eq!(
        CrawlRange::new(Some(2), Some(4)).unwrap().slice(&items),
        &[2, 3, 4]
    );
    assert_eq!(CrawlRange::new(Some(4), None).unwrap().slice(&items), &[4, 5]);
    assert_eq!(
        CrawlRange::new(None, Some(99)).unwrap().slice(&items),
        &[1, 2, 3, 4, 5]
    );
    assert!(CrawlRange::new(Some(9), None)
        .unwrap()
        .slice(&items)
        .is_empty());
}

// -----------------------------------------------------------------------
// Crawler
// -----------------------------------------------------------------------

#[tokio::test]
async fn crawls_and_persists_every_detail_page() {
    let fetcher = FakeFetcher::default()
        .with(LISTING, ok(listing(&["/auktioner/a-1", "/auktioner/b-2"])))
        .with("https://www.kvd.se/auktioner/a-1", ok(detail("/auktioner/a-1")))
        .with("https://www.kvd.se/auktioner/b-2", ok(detail("/auktioner/b-2")));
    let crawler = Crawler::new(fetcher, RecordingSink::default(), options());

    let summary = crawler.run(CrawlRange::all()).await.unwrap();
    assert_eq!(
        summary,
        CrawlSummary {
            processed_urls: 2,
            persisted: 2,
            skipped: 0,
            failed: 0
        }
    );
    let records = crawler.sink().records.lock().unwrap();
    let ids: Vec<_> = records
        .iter()
        .map(|r| r.auction_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(records[0].cost_per_kwh, Some(100_000.0 / 78.0));
}

#[tokio::test]
async fn redirect_skips_parsing_and_persistence() {
    let fetcher = FakeFetcher::default()
        .with(LISTING, ok(listing(&["/auktioner/gone-9"])))
        .with(
            "https://www.kvd.se/auktioner/gone-9",
            Reply::Page(301, String::new(), Some("/stangda-auktioner".to_owned())),
        );
    let crawler = Crawler::new(fetcher, RecordingSink::default(), options());

    let outcome = crawler
        .process_url("https://www.kvd.se/auktioner/gone-9")
        .await;
    assert_eq!(
        outcome,
        PageOutcome::Redirected {
            location: Some("/stangda-auktioner".to_owned())
        }
    );
    assert!(crawler.sink().records.lock().unwrap().is_empty());

    let summary = crawler.run(CrawlRange::all()).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.persisted, 0);
}

#[tokio::test]
async fn range_limits_which_urls_are_fetched() {
    let fetcher = FakeFetcher::default()
        .with(
            LISTING,
            ok(listing(&["/auktioner/a-1", "/auktioner/b-2", "/auktioner/c-3"])),
        )
        .with("https://www.kvd.se/auktioner/b-2", ok(detail("/auktioner/b-2")));
    let calls = Arc::clone(&fetcher.calls);
    let crawler = Crawler::new(fetcher, RecordingSink::default(), options());

    let summary = crawler
        .run(CrawlRange::new(Some(2), Some(2)).unwrap())
        .await
        .unwrap();
    assert_eq!(summary.processed_urls, 1);
    assert_eq!(summary.persisted, 1);
    // listing + one detail page
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn listing_failure_is_an_error() {
    let fetcher = FakeFetcher::default().with(LISTING, Reply::Status(404));
    let crawler = Crawler::new(fetcher, RecordingSink::default(), options());
    let result = crawler.run(CrawlRange::all()).await;
    assert!(matches!(
        result,
        Err(ScraperError::UnexpectedStatus { status: 404, .. })
    ));
}

#[tokio::test]
async fn page_failures_are_counted_not_fatal() {
    let fetcher = FakeFetcher::default()
        .with(
            LISTING,
            ok(listing(&[
                "/auktioner/broken-1",
                "/auktioner/noblob-2",
                "/auktioner/noid",
                "/auktioner/ok-4",
            ])),
        )
        .with("https://www.kvd.se/auktioner/broken-1", Reply::Status(500))
        .with(
            "https://www.kvd.se/auktioner/noblob-2",
            ok("<html><script>var a = 1;</script></html>".to_owned()),
        )
        .with("https://www.kvd.se/auktioner/noid", ok(detail("/auktioner/noid")))
        .with("https://www.kvd.se/auktioner/ok-4", ok(detail("/auktioner/ok-4")));
    let crawler = Crawler::new(fetcher, RecordingSink::default(), options());

    let summary = crawler.run(CrawlRange::all()).await.unwrap();
    assert_eq!(
        summary,
        CrawlSummary {
            processed_urls: 4,
            persisted: 1,
            skipped: 2,
            failed: 1
        }
    );
}

#[tokio::test]
async fn sink_failure_is_counted_and_crawl_continues() {
    let fetcher = FakeFetcher::default()
        .with(LISTING, ok(listing(&["/auktioner/a-1", "/auktioner/b-2"])))
        .with("https://www.kvd.se/auktioner/a-1", ok(detail("/auktioner/a-1")))
        .with("https://www.kvd.se/auktioner/b-2", ok(detail("/auktioner/b-2")));
    let sink = RecordingSink {
        fail: true,
        ..RecordingSink::default()
    };
    let crawler = Crawler::new(fetcher, sink, options());

    let summary = crawler.run(CrawlRange::all()).await.unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.processed_urls, 2);
}

#[tokio::test(start_paused = true)]
async fn waits_between_detail_requests() {
    let fetcher = FakeFetcher::default()
        .with(
            LISTING,
            ok(listing(&["/auktioner/a-1", "/auktioner/b-2", "/auktioner/c-3"])),
        )
        .with("https://www.kvd.se/auktioner/a-1", ok(detail("/auktioner/a-1")))
        .with("https://www.kvd.se/auktioner/b-2", ok(detail("/auktioner/b-2")))
        .with("https://www.kvd.se/auktioner/c-3", ok(detail("/auktioner/c-3")));
    let opts = CrawlOptions {
        inter_request_delay: Duration::from_secs(3),
        ..options()
    };
    let crawler = Crawler::new(fetcher, RecordingSink::default(), opts);

    let started = tokio::time::Instant::now();
    crawler.run(CrawlRange::all()).await.unwrap();
    let elapsed = started.elapsed();
    // two gaps between three pages
    assert!(
        elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7),
        "unexpected total delay: {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn transient_detail_errors_are_retried() {
    let fetcher = FakeFetcher::default()
        .with(LISTING, ok(listing(&["/auktioner/flaky-1"])))
        .with("https://www.kvd.se/auktioner/flaky-1", Reply::Status(503));
    let calls = Arc::clone(&fetcher.calls);
    let opts = CrawlOptions {
        retry: RetryPolicy::new(2, Duration::from_secs(5)),
        ..options()
    };
    let crawler = Crawler::new(fetcher, RecordingSink::default(), opts);

    let summary = crawler.run(CrawlRange::all()).await.unwrap();
    assert_eq!(summary.failed, 1);
    // listing once, detail page three times
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
