//! Embedding providers consumed by the embedding stage.

use std::env;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::config::{ConfigError, EmbeddingConfig, EmbeddingProvider};

pub mod local;
pub mod openai;

pub use self::local::FastEmbedder;
pub use self::openai::OpenAiEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    /// The provider can no longer serve requests in this process.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),
}

impl EmbeddingError {
    /// Client errors other than rate limiting are never retried, nor is a
    /// model that became unusable.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Status { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::ModelUnavailable(_) => false,
            _ => true,
        }
    }
}

/// Turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Box<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text).await
    }
}

/// Builds the configured provider.
///
/// Missing credentials and model load failures surface here, before any
/// page is processed.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, ConfigError> {
    match config.provider {
        EmbeddingProvider::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| env::var("OPENAI_API_KEY").ok())
                .filter(|key| !key.trim().is_empty())
                .ok_or(ConfigError::MissingCredentials("OPENAI_API_KEY"))?;
            Ok(Box::new(OpenAiEmbedder::new(&api_key, config)?))
        }
        EmbeddingProvider::FastEmbed => Ok(Box::new(FastEmbedder::new(config.model.as_deref())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retryable() {
        let rejected = EmbeddingError::Status {
            status: 400,
            body: "bad input".into(),
        };
        let limited = EmbeddingError::Status {
            status: 429,
            body: String::new(),
        };
        let unavailable = EmbeddingError::Status {
            status: 503,
            body: String::new(),
        };

        assert!(!rejected.is_retryable());
        assert!(limited.is_retryable());
        assert!(unavailable.is_retryable());
        assert!(EmbeddingError::Provider("boom".into()).is_retryable());
        assert!(!EmbeddingError::ModelUnavailable("poisoned".into()).is_retryable());
    }

    #[test]
    fn blank_api_key_is_a_configuration_error() {
        let config = EmbeddingConfig {
            api_key: Some("  ".into()),
            ..EmbeddingConfig::default()
        };

        assert!(matches!(
            build_embedder(&config),
            Err(ConfigError::MissingCredentials(_))
        ));
    }
}
