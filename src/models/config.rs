//! Configuration model loaded from external sources.

use std::env;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid exclusion pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("missing {0}; set it in the configuration file or environment")]
    MissingCredentials(&'static str),
    #[error("failed to initialise embedding provider: {0}")]
    EmbedderInit(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
/// Basic configuration shared across handlers.
pub struct ServerConfig {
    pub database_url: String,
    pub zmq_address: String,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Reads `REDIRX_CONFIG` (default `config.yaml`, optional) and overlays
    /// `REDIRX_*` environment variables. Nested keys use `__`, e.g.
    /// `REDIRX_PIPELINE__FETCH__CONCURRENCY=20`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("REDIRX_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "app.db".to_string());
        let zmq_address =
            env::var("ZMQ_ADDRESS").unwrap_or_else(|_| "tcp://127.0.0.1:5555".to_string());

        let settings = Config::builder()
            .set_default("database_url", database_url)?
            .set_default("zmq_address", zmq_address)?
            .add_source(File::new(&path, FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix("REDIRX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.pipeline.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub fetch: FetchConfig,
    pub embedding: EmbeddingConfig,
    pub matching: MatchingConfig,
    /// Pair pages with identical paths before comparing content.
    pub match_exact_paths: bool,
}

impl PipelineConfig {
    /// Rejects settings that would make a stage meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::Invalid("fetch.concurrency must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be > 0".into()));
        }
        if self.embedding.concurrency == 0 {
            return Err(ConfigError::Invalid("embedding.concurrency must be > 0".into()));
        }
        if self.embedding.max_attempts == 0 {
            return Err(ConfigError::Invalid("embedding.max_attempts must be > 0".into()));
        }
        if self.matching.candidate_count == 0 {
            return Err(ConfigError::Invalid("matching.candidate_count must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.matching.min_score) {
            return Err(ConfigError::Invalid("matching.min_score must be within [0, 1]".into()));
        }
        if self.matching.near_tie_margin < 0.0 {
            return Err(ConfigError::Invalid("matching.near_tie_margin must be >= 0".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Lower-case file extensions, without the dot.
    pub excluded_extensions: Vec<String>,
    /// Regular expressions matched against the lower-cased URL path.
    pub excluded_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let extensions = [
            // stylesheets and scripts
            "css", "js", "mjs", "map",
            // images
            "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "bmp", "avif", "tif", "tiff",
            // fonts
            "woff", "woff2", "ttf", "eot", "otf",
            // documents, archives and data
            "pdf", "zip", "gz", "tar", "rar", "csv", "txt", "json", "xml", "rss",
            // media
            "mp4", "mp3", "webm", "wav", "ogg", "mov", "avi",
        ];
        let patterns = [
            r"^/\d{4}(/\d{1,2}){0,2}/?$",
            r"^/(tag|tags|category|categories|author)(/|$)",
            r"/page/\d+/?$",
        ];
        Self {
            excluded_extensions: extensions.iter().map(|e| e.to_string()).collect(),
            excluded_patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum number of requests in flight.
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_secs: 30,
            user_agent: concat!("redirx/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    FastEmbed,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Provider-specific model name; each provider has its own default.
    pub model: Option<String>,
    /// Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub dimensions: Option<usize>,
    pub timeout_secs: u64,
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub max_input_chars: usize,
    /// Extracted text shorter than this is replaced by the page URL.
    pub min_text_len: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: None,
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            dimensions: None,
            timeout_secs: 30,
            batch_size: 10,
            concurrency: 10,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            max_input_chars: 32_000,
            min_text_len: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Neighbours requested per old page.
    pub candidate_count: usize,
    /// Candidates scoring below this never become a match.
    pub min_score: f32,
    /// Top-two gap under which a match is annotated as a near tie.
    pub near_tie_margin: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            candidate_count: 5,
            min_score: 0.5,
            near_tie_margin: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.max_attempts, 3);
        assert_eq!(config.embedding.retry_base_delay_ms, 1_000);
        assert_eq!(config.embedding.provider, EmbeddingProvider::OpenAi);
        assert!(!config.match_exact_paths);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = PipelineConfig::default();
        config.embedding.batch_size = 0;

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "
database_url: test.db
zmq_address: tcp://127.0.0.1:6000
pipeline:
  embedding:
    provider: fastembed
    batch_size: 4
  matching:
    min_score: 0.4
";
        let config: ServerConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .and_then(Config::try_deserialize)
            .expect("yaml should deserialize");

        assert_eq!(config.database_url, "test.db");
        assert_eq!(config.pipeline.embedding.provider, EmbeddingProvider::FastEmbed);
        assert_eq!(config.pipeline.embedding.batch_size, 4);
        assert_eq!(config.pipeline.embedding.max_attempts, 3);
        assert_eq!(config.pipeline.matching.min_score, 0.4);
        assert_eq!(config.pipeline.fetch.concurrency, 10);
    }
}
