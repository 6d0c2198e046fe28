use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::domain::embedding::{Candidate, NewEmbedding};
use crate::domain::page::{Page, SiteSide, truncate_chars};
use crate::domain::session::SessionId;
use crate::embedder::{Embedder, EmbeddingError};
use crate::models::config::EmbeddingConfig;
use crate::repository::EmbeddingWriter;
use crate::repository::errors::RepositoryError;

#[derive(Debug, Error)]
pub enum PageEmbeddingError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("failed to store embedding: {0}")]
    Repository(#[from] RepositoryError),
}

/// A page that could not be embedded and stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmbeddingFailure {
    pub side: SiteSide,
    pub url: String,
    pub reason: String,
}

/// Attempt budget and backoff for a single embedding call.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry `n`, counting from 1: `base_delay * 2^(n-1)`.
    pub fn delay(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(2u32.pow(exponent))
    }
}

impl From<&EmbeddingConfig> for RetryPolicy {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

/// Normalize a vector to unit length.
///
/// Returns the original vector when the norm is zero.
pub(crate) fn normalize_embedding(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vec.to_vec()
    } else {
        vec.iter().map(|x| x / norm).collect()
    }
}

/// Text sent to the provider for `page`.
///
/// Near-empty pages are represented by their URL so they still get a vector.
pub(crate) fn embedding_input(page: &Page, config: &EmbeddingConfig) -> String {
    let text = page.extracted_text();
    if text.chars().count() < config.min_text_len {
        return page.url().to_string();
    }
    truncate_chars(text, config.max_input_chars)
}

/// Calls the provider until it succeeds, a non-retryable error occurs or
/// the attempt budget is spent.
pub async fn embed_with_retry<E>(
    embedder: &E,
    text: &str,
    policy: &RetryPolicy,
) -> Result<Vec<f32>, EmbeddingError>
where
    E: Embedder + ?Sized,
{
    let mut attempt = 1;
    loop {
        match embedder.embed(text).await {
            Ok(vector) => return Ok(vector),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                log::warn!(
                    "Embedding attempt {attempt}/{} failed: {err}; retrying in {delay:?}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn embed_page<E, R>(
    page: &Page,
    session_id: &SessionId,
    embedder: &E,
    repo: &R,
    config: &EmbeddingConfig,
    policy: &RetryPolicy,
) -> Result<(), PageEmbeddingError>
where
    E: Embedder + ?Sized,
    R: EmbeddingWriter + Sync,
{
    let input = embedding_input(page, config);
    let vector = embed_with_retry(embedder, &input, policy).await?;
    if vector.is_empty() {
        return Err(EmbeddingError::InvalidResponse("empty embedding".to_string()).into());
    }
    let vector = normalize_embedding(&vector);

    repo.insert_embedding(&NewEmbedding {
        session_id,
        side: page.side(),
        url: page.url(),
        vector: &vector,
        extracted_text: page.extracted_text(),
        title: page.title(),
    })?;

    Ok(())
}

/// Embeds and stores every page of one side.
///
/// Pages are processed in batches of `batch_size`; requests inside a batch
/// run concurrently, batches run one after another. A failing page never
/// affects its siblings. Returns the pages that could not be embedded.
pub async fn embed_pages<E, R>(
    pages: &[Page],
    side: SiteSide,
    session_id: &SessionId,
    embedder: &E,
    repo: &R,
    config: &EmbeddingConfig,
) -> Vec<EmbeddingFailure>
where
    E: Embedder + ?Sized,
    R: EmbeddingWriter + Sync,
{
    let policy = RetryPolicy::from(config);
    let mut failed = Vec::new();

    for (number, batch) in pages.chunks(config.batch_size.max(1)).enumerate() {
        let futures: Vec<_> = batch
            .iter()
            .map(|page| embed_page(page, session_id, embedder, repo, config, &policy))
            .collect();
        let results: Vec<_> = stream::iter(futures)
            .buffered(config.concurrency.max(1))
            .collect()
            .await;

        for (page, result) in batch.iter().zip(results) {
            if let Err(err) = result {
                log::error!("Failed to embed {side} page {}: {err}", page.url());
                failed.push(EmbeddingFailure {
                    side,
                    url: page.url().to_string(),
                    reason: err.to_string(),
                });
            }
        }
        log::debug!("Embedded {side} batch {} ({} pages)", number + 1, batch.len());
    }

    log::info!(
        "side={side} embedded={} failed={}",
        pages.len() - failed.len(),
        failed.len()
    );

    failed
}

/// Cosine index over the stored vectors of one side, built once and
/// queried for every page of the other side.
#[derive(Default)]
pub struct VectorIndex {
    urls: Vec<String>,
    index: Option<Index>,
    dimensions: usize,
}

impl VectorIndex {
    /// Vectors whose length differs from the first one are skipped.
    pub fn build(rows: Vec<(String, Vec<f32>)>) -> Result<Self, Box<dyn std::error::Error>> {
        let Some(dimensions) = rows.first().map(|(_, vector)| vector.len()) else {
            return Ok(Self::default());
        };

        let index = Index::new(&IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            ..Default::default()
        })?;

        index.reserve(rows.len())?;

        let mut urls = Vec::with_capacity(rows.len());
        for (url, vector) in rows {
            if vector.len() != dimensions {
                log::warn!(
                    "Skipping vector of {url}: {} dimensions, expected {dimensions}",
                    vector.len()
                );
                continue;
            }
            index.add(urls.len() as u64, vector.as_slice())?;
            urls.push(url);
        }

        Ok(Self {
            urls,
            index: Some(index),
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Up to `k` URLs closest to `query`, best first, with a cosine
    /// similarity of at least `min_score`.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
        let Some(index) = &self.index else {
            return Ok(Vec::new());
        };
        if k == 0 || self.urls.is_empty() || query.len() != self.dimensions {
            return Ok(Vec::new());
        }

        let neighbors = index.search(query, k)?;

        Ok(neighbors
            .keys
            .iter()
            .zip(neighbors.distances.iter())
            .filter_map(|(&key, &distance)| {
                let similarity = 1.0 - distance;
                let url = self.urls.get(key as usize)?;
                (similarity >= min_score).then(|| Candidate {
                    url: url.clone(),
                    similarity,
                })
            })
            .collect())
    }
}
