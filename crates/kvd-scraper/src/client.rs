//! HTTP page fetcher for kvd.se listing and detail pages.

use std::future::Future;
use std::time::Duration;

use reqwest::{redirect, Client, StatusCode};

use crate::error::ScraperError;

/// Status, body, and redirect target of one fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
    /// `Location` header of a 3xx response.
    pub location: Option<String>,
}

impl FetchedPage {
    /// Any 3xx, matching what [`KvdClient`] returns without a body.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Fetches one page. Implementations apply a per-request timeout and never
/// retry; retrying is the caller's decision.
pub trait PageFetcher {
    /// With `follow_redirects = false` a 3xx response is returned as a
    /// [`FetchedPage`] so the caller can see it. 429 and other non-2xx
    /// statuses are errors.
    fn fetch(
        &self,
        url: &str,
        follow_redirects: bool,
    ) -> impl Future<Output = Result<FetchedPage, ScraperError>> + Send;
}

/// reqwest-backed [`PageFetcher`].
///
/// Holds two clients because reqwest fixes the redirect policy at build time.
#[derive(Debug, Clone)]
pub struct KvdClient {
    following: Client,
    non_following: Client,
}

impl KvdClient {
    /// Creates a `KvdClient` with the given per-request timeout and `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, ScraperError> {
        let builder = || {
            Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .user_agent(user_agent)
        };
        Ok(Self {
            following: builder().build()?,
            non_following: builder().redirect(redirect::Policy::none()).build()?,
        })
    }
}

impl PageFetcher for KvdClient {
    async fn fetch(&self, url: &str, follow_redirects: bool) -> Result<FetchedPage, ScraperError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| ScraperError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        let client = if follow_redirects {
            &self.following
        } else {
            &self.non_following
        };

        let response = client
            .get(parsed)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "sv-SE,sv;q=0.9,en;q=0.8")
            .send()
            .await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            return Ok(FetchedPage {
                status: status.as_u16(),
                body: String::new(),
                location,
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ScraperError::RateLimited {
                url: url.to_owned(),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response.text().await?;
        Ok(FetchedPage {
            status: status.as_u16(),
            body,
            location: None,
        })
    }
}
