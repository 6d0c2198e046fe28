//! Local embedding model via `fastembed`.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embedder::{Embedder, EmbeddingError};
use crate::models::config::ConfigError;

const DEFAULT_MODEL: &str = "MultilingualE5Large";

/// Runs an ONNX model in-process. Inference happens on the blocking pool so
/// the scheduler keeps serving other tasks.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    pub fn new(model_name: Option<&str>) -> Result<Self, ConfigError> {
        let model = match model_name.unwrap_or(DEFAULT_MODEL) {
            "MultilingualE5Large" => EmbeddingModel::MultilingualE5Large,
            "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
            "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unsupported fastembed model: {other}"
                )));
            }
        };

        let embedder = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|error| ConfigError::EmbedderInit(format!("{error:?}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedder)),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut model = lock_model(&model)?;
            model
                .embed(vec![text], None)
                .map_err(|error| EmbeddingError::Provider(format!("{error:?}")))?
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::InvalidResponse("model returned no embedding".into()))
        })
        .await
        .map_err(|error| EmbeddingError::Provider(error.to_string()))?
    }
}

/// A panic during inference poisons the model for the rest of the process.
fn lock_model<T>(model: &Mutex<T>) -> Result<MutexGuard<'_, T>, EmbeddingError> {
    model
        .lock()
        .map_err(|_| EmbeddingError::ModelUnavailable("embedding model lock poisoned".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisoned_model_fails_without_retry() {
        let model = Arc::new(Mutex::new(0_u8));
        let poisoner = Arc::clone(&model);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("inference panicked");
        })
        .join();

        let err = lock_model(&model).err().expect("lock is poisoned");

        assert!(matches!(err, EmbeddingError::ModelUnavailable(_)));
        assert!(!err.is_retryable());
        assert!(lock_model(&Mutex::new(1_u8)).is_ok());
    }
}
