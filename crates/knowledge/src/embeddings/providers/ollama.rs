//! Ollama embedding provider.
//!
//! Sends whole batches to `/api/embed` and retries transient failures with
//! exponential backoff.

use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use recall_core::{AppError, AppResult};
use recall_llm::{OllamaError, OllamaHttp, DEFAULT_OLLAMA_URL};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

const ATTEMPTS: u32 = 3;
const FIRST_BACKOFF: Duration = Duration::from_millis(200);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    http: OllamaHttp,
    model: String,
    dimensions: usize,
}

impl OllamaProvider {
    /// The endpoint comes from the config, then `OLLAMA_URL`, then the
    /// default local address. Nothing is sent until the first embedding.
    pub fn new(config: &EmbeddingConfig) -> Self {
        let base_url = config
            .endpoint
            .clone()
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Self {
            http: OllamaHttp::new(base_url),
            model: config.model.clone(),
            dimensions: config.dimensions,
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        let body = EmbedBody {
            model: &self.model,
            input: texts,
        };
        let reply: EmbedReply = self.http.post("/api/embed", &body, Some(REQUEST_TIMEOUT)).await?;
        Ok(reply.embeddings)
    }

    fn check(&self, texts: &[String], embeddings: &[Vec<f32>]) -> AppResult<()> {
        if embeddings.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Ollama returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        if let Some(wrong) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(AppError::Embedding(format!(
                "Ollama model '{}' returned {} dimensions, expected {}",
                self.model,
                wrong.len(),
                self.dimensions
            )));
        }

        Ok(())
    }
}

/// Only transport failures and server errors are worth another attempt.
fn is_transient(error: &OllamaError) -> bool {
    match error {
        OllamaError::Transport { .. } => true,
        OllamaError::Status { status, .. } => status.is_server_error(),
        OllamaError::Decode(_) => false,
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::Embedding("Cannot embed empty text".to_string()));
        }

        let mut backoff = FIRST_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.request(texts).await {
                Ok(embeddings) => {
                    self.check(texts, &embeddings)?;
                    return Ok(embeddings);
                }
                Err(e) if attempt < ATTEMPTS && is_transient(&e) => {
                    warn!(
                        "Embedding request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, ATTEMPTS, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(AppError::Embedding(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(endpoint: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 3,
            endpoint: Some(endpoint.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let provider = OllamaProvider::new(&test_config("http://localhost:11434/"));
        assert_eq!(provider.http.base_url(), "http://localhost:11434");
        assert_eq!(provider.dimensions(), 3);
    }

    #[test]
    fn test_check_rejects_wrong_shape() {
        let provider = OllamaProvider::new(&test_config("http://127.0.0.1:9"));
        let texts = vec!["a".to_string(), "b".to_string()];

        assert!(provider.check(&texts, &vec![vec![0.1, 0.2, 0.3]; 2]).is_ok());
        assert!(provider.check(&texts, &[vec![0.1, 0.2, 0.3]]).is_err());
        assert!(provider.check(&texts, &vec![vec![0.1, 0.2]; 2]).is_err());
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let provider = OllamaProvider::new(&test_config("http://127.0.0.1:9"));
        assert!(provider.embed("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        let provider = OllamaProvider::new(&test_config("http://127.0.0.1:9"));
        let result = provider.embed_batch(&["hello".to_string()]).await;
        assert!(matches!(result, Err(AppError::Embedding(_))));
    }
}
