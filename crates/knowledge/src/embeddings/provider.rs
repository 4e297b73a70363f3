//! The embedding provider seam.

use crate::embeddings::config::EmbeddingConfig;
use crate::embeddings::providers::{HashingProvider, OllamaProvider};
use recall_core::{AppError, AppResult};
use std::sync::Arc;

/// Turns text into fixed-length vectors.
///
/// Implementations return raw vectors; normalization, batching and the
/// zero-vector fallback live in [`EmbeddingService`](super::EmbeddingService).
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Provider returned no vector".to_string()))
    }
}

/// Provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "hashing" | "trigram" => Arc::new(HashingProvider::new(config.dimensions)),
        "ollama" => Arc::new(OllamaProvider::new(config)),
        other => {
            return Err(AppError::Config(format!(
                "Unknown embedding provider '{}' (expected hashing or ollama)",
                other
            )))
        }
    };

    tracing::debug!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        dimensions = provider.dimensions(),
        "Created embedding provider"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_provider_is_local() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.provider_name(), "hashing");
        assert_eq!(provider.model_name(), "trigram-v1");

        let embedding = provider.embed("ownership and borrowing").await.unwrap();
        assert_eq!(embedding.len(), provider.dimensions());
    }

    #[test]
    fn test_ollama_provider_uses_configured_model() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            ..Default::default()
        };

        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..Default::default()
        };

        assert!(matches!(create_provider(&config), Err(AppError::Config(_))));
    }
}
