use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::crawlers::{CrawlerError, CrawlerResult, PageFetcher, build_reqwest_client};
use crate::models::config::FetchConfig;

/// HTTP fetcher which limits concurrent requests using a [`Semaphore`].
pub struct HttpPageFetcher {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl HttpPageFetcher {
    /// Creates a new fetcher from the fetch settings.
    ///
    /// `config.concurrency` controls how many HTTP requests may be in flight
    /// at the same time.
    pub fn new(config: &FetchConfig) -> CrawlerResult<Self> {
        Ok(Self {
            client: build_reqwest_client(config)?,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    /// Fetches a URL and returns its body as text.
    ///
    /// A permit from the internal [`Semaphore`] is held for the whole
    /// request, including reading the body.
    async fn fetch(&self, url: &str) -> CrawlerResult<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CrawlerError::Build(e.to_string()))?;

        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            return Err(CrawlerError::Status(res.status().as_u16()));
        }
        Ok(res.text().await?)
    }
}
