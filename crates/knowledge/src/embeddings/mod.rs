//! Embedding service for the knowledge engine.
//!
//! Wraps a provider with batching, normalization and the degraded
//! zero-vector fallback: an embedding failure is logged and never fails
//! ingestion or a query.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::{EmbeddingConfig, EmbeddingSignature};
pub use provider::{create_provider, EmbeddingProvider};

use crate::similarity::normalize_vector;
use recall_core::AppResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Batching, failure-tolerant front end to an embedding provider.
#[derive(Debug)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    normalize: bool,
    ready: AtomicBool,
}

impl EmbeddingService {
    /// Create a service from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> AppResult<Self> {
        let provider = create_provider(config)?;
        Ok(Self::new(provider, config.batch_size, config.normalize))
    }

    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, normalize: bool) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            normalize,
            ready: AtomicBool::new(false),
        }
    }

    /// Warm up the provider with a sample embedding.
    ///
    /// Returns whether the provider answered. A failed warm-up leaves the
    /// service usable in degraded mode.
    pub async fn initialize(&self) -> bool {
        match self.provider.embed("warm up").await {
            Ok(_) => {
                self.ready.store(true, Ordering::SeqCst);
                tracing::info!(
                    provider = self.provider.provider_name(),
                    model = self.provider.model_name(),
                    dimensions = self.provider.dimensions(),
                    "Embedding provider ready"
                );
                true
            }
            Err(e) => {
                self.ready.store(false, Ordering::SeqCst);
                tracing::warn!(
                    provider = self.provider.provider_name(),
                    "Embedding provider unavailable, using zero vectors: {}",
                    e
                );
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Signature of the vectors this service produces.
    pub fn signature(&self) -> EmbeddingSignature {
        EmbeddingSignature {
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
            dimensions: self.provider.dimensions(),
        }
    }

    /// Embed a query. Falls back to a zero vector on failure.
    pub async fn embed_query(&self, text: &str) -> Vec<f32> {
        match self.provider.embed(text).await {
            Ok(embedding) => self.finish(embedding),
            Err(e) => {
                tracing::warn!("Query embedding failed, using zero vector: {}", e);
                vec![0.0; self.dimensions()]
            }
        }
    }

    /// Embed texts in batches. A failed batch yields zero vectors for its
    /// texts; the output always has one vector per input.
    pub async fn embed_texts(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            match self.provider.embed_batch(batch).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    embeddings.extend(vectors.into_iter().map(|v| self.finish(v)));
                }
                Ok(vectors) => {
                    tracing::warn!(
                        batch = batch_index,
                        expected = batch.len(),
                        returned = vectors.len(),
                        "Embedding batch returned wrong count, using zero vectors"
                    );
                    embeddings.extend(batch.iter().map(|_| vec![0.0; self.dimensions()]));
                }
                Err(e) => {
                    tracing::warn!(
                        batch = batch_index,
                        size = batch.len(),
                        "Embedding batch failed, using zero vectors: {}",
                        e
                    );
                    embeddings.extend(batch.iter().map(|_| vec![0.0; self.dimensions()]));
                }
            }
        }

        tracing::debug!(
            "Generated {} embeddings of dimension {}",
            embeddings.len(),
            self.dimensions()
        );

        embeddings
    }

    fn finish(&self, embedding: Vec<f32>) -> Vec<f32> {
        if embedding.len() != self.dimensions() {
            tracing::warn!(
                expected = self.dimensions(),
                returned = embedding.len(),
                "Embedding has wrong dimension, using zero vector"
            );
            return vec![0.0; self.dimensions()];
        }

        if self.normalize {
            normalize_vector(&embedding)
        } else {
            embedding
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::AppError;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn provider_name(&self) -> &str {
            "flaky"
        }

        fn model_name(&self) -> &str {
            "flaky-v1"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 1 {
                return Err(AppError::Embedding("connection reset".to_string()));
            }
            Ok(texts.iter().map(|_| vec![2.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_texts_batches_and_degrades() {
        let provider = Arc::new(FlakyProvider::default());
        let service = EmbeddingService::new(provider.clone(), 2, true);

        let texts: Vec<String> = (0..5).map(|i| format!("text {}", i)).collect();
        let embeddings = service.embed_texts(&texts).await;

        assert_eq!(embeddings.len(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        // First batch normalized, second batch failed, third batch normalized
        assert_eq!(embeddings[0], vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(embeddings[2], vec![0.0; 4]);
        assert_eq!(embeddings[3], vec![0.0; 4]);
        assert_eq!(embeddings[4], vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embed_query_degrades_to_zero_vector() {
        let provider = Arc::new(FlakyProvider::default());
        let service = EmbeddingService::new(provider, 10, false);

        assert_eq!(service.embed_query("first").await, vec![2.0, 0.0, 0.0, 0.0]);
        assert_eq!(service.embed_query("second").await, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn test_initialize_marks_ready() {
        let service = EmbeddingService::from_config(&EmbeddingConfig::default()).unwrap();
        assert!(!service.is_ready());
        assert!(service.initialize().await);
        assert!(service.is_ready());
        assert_eq!(service.model_name(), "trigram-v1");
    }
}
