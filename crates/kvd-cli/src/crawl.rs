//! `crawl` command handler.

use std::io::Write;
use std::sync::Mutex;

use kvd_core::{AppConfig, AuctionRecord, AuctionSink, PersistOutcome};
use kvd_db::PgAuctionStore;
use kvd_scraper::{CrawlOptions, CrawlRange, CrawlSummary, Crawler, KvdClient};

/// Writes each record as one JSON line instead of persisting it.
pub(crate) struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> AuctionSink for JsonLinesSink<W> {
    type Error = serde_json::Error;

    async fn persist(&self, record: &AuctionRecord) -> Result<PersistOutcome, serde_json::Error> {
        if record.persistable_id().is_none() {
            tracing::warn!(
                auction_url = record.auction_url.as_deref().unwrap_or(""),
                "auction has no id, not printing"
            );
            return Ok(PersistOutcome::Skipped);
        }
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out).map_err(serde_json::Error::io)?;
        Ok(PersistOutcome::Inserted)
    }
}

/// Crawl the listing and either persist into Postgres or, with `dry_run`,
/// print records to stdout without connecting to the database.
///
/// # Errors
///
/// Returns an error if the range is invalid or the HTTP client cannot be
/// built. Without `dry_run` it also fails when `DATABASE_URL` is unset or
/// the database is unreachable. A failed listing fetch is an error too.
pub(crate) async fn run_crawl(
    config: &AppConfig,
    start: Option<usize>,
    end: Option<usize>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let range = CrawlRange::new(start, end)?;
    let client = KvdClient::new(
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
    )?;
    let options = CrawlOptions::from_config(config);

    let summary = if dry_run {
        Crawler::new(client, JsonLinesSink::new(std::io::stdout()), options)
            .run(range)
            .await?
    } else {
        let pool = kvd_db::connect_pool_from_config(config).await?;
        Crawler::new(client, PgAuctionStore::new(pool), options)
            .run(range)
            .await?
    };

    print_summary(&summary, dry_run);
    Ok(())
}

fn print_summary(summary: &CrawlSummary, dry_run: bool) {
    let verb = if dry_run { "printed" } else { "persisted" };
    eprintln!(
        "crawl complete: {} urls processed, {} {verb}, {} skipped, {} failed",
        summary.processed_urls, summary.persisted, summary.skipped, summary.failed
    );
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use kvd_core::Environment;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Config with no `DATABASE_URL`, pointed at `base_url`.
    fn config_without_database(base_url: &str) -> AppConfig {
        AppConfig {
            database_url: None,
            env: Environment::Test,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            log_level: "info".to_string(),
            db_max_connections: 1,
            db_min_connections: 0,
            db_acquire_timeout_secs: 1,
            base_url: base_url.to_string(),
            listing_path: "/stangda-auktioner".to_string(),
            scraper_request_timeout_secs: 5,
            scraper_user_agent: "kvd-test/0.1".to_string(),
            scraper_inter_request_delay_ms: 0,
            scraper_max_retries: 0,
            scraper_retry_backoff_base_secs: 0,
            scraper_lenient_json: true,
            crawl_schedule: "0 0 5 * * *".to_string(),
        }
    }

    #[tokio::test]
    async fn dry_run_needs_no_database_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stangda-auktioner"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/auktioner/volvo-xc40-recharge-31">XC40</a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auktioner/volvo-xc40-recharge-31"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<script>window.__STATE__ = {"objectView":{"storeObjects":{"a":{
                    "auctionUrl":"/auktioner/volvo-xc40-recharge-31",
                    "processObject":{"properties":{"brand":"Volvo"}}
                }}}};</script>"#,
            ))
            .mount(&server)
            .await;

        let config = config_without_database(&server.uri());
        run_crawl(&config, None, None, true)
            .await
            .expect("dry run should not touch the database");
    }

    #[tokio::test]
    async fn persisting_crawl_requires_database_url() {
        let config = config_without_database("http://127.0.0.1:9");
        let err = run_crawl(&config, None, None, false)
            .await
            .expect_err("no database configured");
        assert!(
            err.to_string().contains("DATABASE_URL"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn json_lines_sink_prints_one_record_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        let record = AuctionRecord {
            auction_id: Some("12".to_string()),
            brand: Some("Volvo".to_string()),
            ..AuctionRecord::default()
        };

        assert_eq!(
            sink.persist(&record).await.unwrap(),
            PersistOutcome::Inserted
        );
        assert_eq!(
            sink.persist(&record).await.unwrap(),
            PersistOutcome::Inserted
        );

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["auctionId"], "12");
        assert_eq!(parsed["brand"], "Volvo");
    }

    #[tokio::test]
    async fn json_lines_sink_skips_records_without_id() {
        let sink = JsonLinesSink::new(Vec::new());
        let outcome = sink.persist(&AuctionRecord::default()).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Skipped);
        assert!(sink.into_inner().is_empty());
    }
}
