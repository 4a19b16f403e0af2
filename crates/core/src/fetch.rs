//! Article text acquisition.
//!
//! An [`Acquirer`] walks an ordered list of [`Scraper`] providers: a "reader"
//! proxy that turns any URL into markdown with a plain GET, and a "crawler" API
//! that takes a JSON POST. Each provider call is retried under a
//! [`RetryPolicy`]; the first provider whose purified output is long enough
//! wins.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::purify::purify;
use crate::retry::RetryPolicy;
use crate::{PrecisError, Result};

/// Cleaned text shorter than this is treated as a placeholder page.
pub const MIN_ARTICLE_CHARS: usize = 500;

/// Default reader proxy. The target URL is appended as the path.
pub const DEFAULT_READER_ENDPOINT: &str = "https://r.jina.ai";

/// Default crawl API.
pub const DEFAULT_CRAWLER_ENDPOINT: &str = "https://api.spider.cloud/crawl";

/// Shared HTTP client; per-request timeouts are set by each caller.
pub fn http_client() -> Result<Client> {
    Ok(Client::builder().connect_timeout(Duration::from_secs(10)).build()?)
}

/// HTTP client configuration for scraping providers.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
    /// Retry schedule applied to each provider independently.
    pub retry: RetryPolicy,
    /// Minimum purified length accepted from any provider but the last.
    pub min_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: 20,
            user_agent: "Mozilla/5.0 (compatible; Precis/1.0)".to_string(),
            retry: RetryPolicy::default(),
            min_chars: MIN_ARTICLE_CHARS,
        }
    }
}

/// One scraping backend with its fixed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scraper {
    /// Text-extraction proxy: `GET {endpoint}/{url}` returns markdown.
    Reader { endpoint: String },
    /// Crawl API: `POST {endpoint}` with a one-page, markdown-format crawl.
    Crawler { endpoint: String, api_key: String },
}

impl Scraper {
    /// Reader pointed at the public endpoint.
    pub fn reader() -> Self {
        Scraper::Reader { endpoint: DEFAULT_READER_ENDPOINT.to_string() }
    }

    /// Crawler pointed at the public endpoint.
    pub fn crawler(api_key: impl Into<String>) -> Self {
        Scraper::Crawler { endpoint: DEFAULT_CRAWLER_ENDPOINT.to_string(), api_key: api_key.into() }
    }

    /// Short provider name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Scraper::Reader { .. } => "reader",
            Scraper::Crawler { .. } => "crawler",
        }
    }

    /// One attempt against this provider, returning purified text.
    ///
    /// An empty body or missing content is an error so the retry loop tries
    /// again; a body that purifies down to nothing is returned as-is and left
    /// to the chain's length check.
    pub async fn scrape(&self, client: &Client, url: &str, config: &FetchConfig) -> Result<String> {
        let raw = match self {
            Scraper::Reader { endpoint } => {
                let target = reader_url(endpoint, url);
                debug!(provider = self.name(), url = %target, "sending request");
                let response = client
                    .get(&target)
                    .timeout(Duration::from_secs(config.timeout))
                    .header("User-Agent", &config.user_agent)
                    .send()
                    .await
                    .map_err(|e| timeout_or_http(e, config.timeout))?;
                let response = check_status(self.name(), response)?;
                response.text().await?
            }
            Scraper::Crawler { endpoint, api_key } => {
                let body = json!({ "url": url, "limit": 1, "return_format": "markdown" });
                debug!(provider = self.name(), url = %endpoint, body = %body, "sending request");
                let response = client
                    .post(endpoint)
                    .timeout(Duration::from_secs(config.timeout))
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| timeout_or_http(e, config.timeout))?;
                let response = check_status(self.name(), response)?;
                let pages: Vec<CrawlPage> = response.json().await?;
                pages.into_iter().next().and_then(|p| p.content).unwrap_or_default()
            }
        };

        if raw.trim().is_empty() {
            return Err(PrecisError::BadResponse {
                provider: self.name().to_string(),
                reason: "empty content".to_string(),
            });
        }

        Ok(purify(&raw))
    }
}

#[derive(Debug, Deserialize)]
struct CrawlPage {
    #[serde(default)]
    content: Option<String>,
}

/// Build the reader proxy URL for `url`.
pub fn reader_url(endpoint: &str, url: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), url)
}

fn timeout_or_http(e: reqwest::Error, timeout: u64) -> PrecisError {
    if e.is_timeout() { PrecisError::Timeout { timeout } } else { PrecisError::HttpError(e) }
}

pub(crate) fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PrecisError::Status { provider: provider.to_string(), status: status.as_u16() })
    }
}

/// The text acquisition chain.
#[derive(Debug, Clone)]
pub struct Acquirer {
    client: Client,
    scrapers: Vec<Scraper>,
    config: FetchConfig,
}

impl Acquirer {
    pub fn new(client: Client, scrapers: Vec<Scraper>, config: FetchConfig) -> Self {
        Self { client, scrapers, config }
    }

    pub fn scrapers(&self) -> &[Scraper] {
        &self.scrapers
    }

    /// Fetch and clean the article behind `url`.
    ///
    /// Providers are tried in order. A provider's text is accepted when it is
    /// at least `min_chars` long, or when it is non-empty and comes from the
    /// last provider. Returns `None` when nothing usable came back; never
    /// returns an error.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let last = self.scrapers.len().saturating_sub(1);
        let (client, config) = (&self.client, &self.config);

        for (index, scraper) in self.scrapers.iter().enumerate() {
            let text = self
                .config
                .retry
                .run(scraper.name(), move |_| scraper.scrape(client, url, config))
                .await;

            match text {
                Some(text) if text.is_empty() => {
                    warn!(provider = scraper.name(), "purified text is empty");
                }
                Some(text) => {
                    let chars = text.chars().count();
                    if chars >= self.config.min_chars || index == last {
                        info!(provider = scraper.name(), chars, "acquired article text");
                        return Some(text);
                    }
                    warn!(provider = scraper.name(), chars, min = self.config.min_chars, "text too short, trying next provider");
                }
                None => {}
            }
        }

        warn!(url, "no provider returned article text");
        None
    }
}
