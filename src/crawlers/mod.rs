use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use serde::Serialize;
use thiserror::Error;

use crate::domain::page::{Page, SiteSide};
use crate::models::config::FetchConfig;

pub mod http;

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("failed to build HTTP client: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}

pub type CrawlerResult<T> = Result<T, CrawlerError>;

/// An abstraction over anything that can return the raw HTML of a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a single URL. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> CrawlerResult<String>;
}

/// A URL that could not be retrieved; it takes no further part in the run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FetchFailure {
    pub side: SiteSide,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub pages: Vec<Page>,
    pub failures: Vec<FetchFailure>,
}

pub fn build_reqwest_client(config: &FetchConfig) -> CrawlerResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CrawlerError::Build(e.to_string()))
}

/// Fetches every URL of one side concurrently and waits for all of them.
///
/// Concurrency is bounded by the fetcher itself. A failing URL is recorded
/// and never affects its siblings. Pages keep the order of `urls`.
pub async fn fetch_pages<F>(fetcher: &F, side: SiteSide, urls: &[String]) -> FetchOutcome
where
    F: PageFetcher + ?Sized,
{
    let tasks = urls
        .iter()
        .map(|url| async move { (url, fetcher.fetch(url).await) });
    let results = future::join_all(tasks).await;

    let mut outcome = FetchOutcome::default();
    for (url, result) in results {
        match result {
            Ok(html) => outcome.pages.push(Page::new(side, url.as_str(), html)),
            Err(e) => {
                log::warn!("Failed to fetch {side} page {url}: {e}");
                outcome.failures.push(FetchFailure {
                    side,
                    url: url.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    outcome
}

/// Fetches both sites at once; returns when every request has settled.
pub async fn fetch_sites<F>(
    fetcher: &F,
    old_urls: &[String],
    new_urls: &[String],
) -> (FetchOutcome, FetchOutcome)
where
    F: PageFetcher + ?Sized,
{
    tokio::join!(
        fetch_pages(fetcher, SiteSide::Old, old_urls),
        fetch_pages(fetcher, SiteSide::New, new_urls),
    )
}
