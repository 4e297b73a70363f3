//! Embedding configuration types.

use recall_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Embedding configuration for an engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "hashing", "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding vector dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Whether to normalize embeddings to unit length
    #[serde(default = "default_normalize")]
    pub normalize: bool,

    /// Maximum batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Endpoint for network providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_provider() -> String {
    "hashing".to_string()
}

fn default_model() -> String {
    "trigram-v1".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_normalize() -> bool {
    true
}

fn default_batch_size() -> usize {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            normalize: default_normalize(),
            batch_size: default_batch_size(),
            endpoint: None,
        }
    }
}

/// The part of an embedding config that determines vector compatibility.
///
/// Recorded in the store so an index built with one model is never queried
/// with vectors from another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSignature {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl EmbeddingConfig {
    pub fn signature(&self) -> EmbeddingSignature {
        EmbeddingSignature {
            provider: self.provider.clone(),
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }
}

impl EmbeddingSignature {
    /// Validate that a stored signature matches the configured one.
    pub fn validate_consistency(&self, other: &Self) -> AppResult<()> {
        if self.provider != other.provider {
            return Err(AppError::Embedding(format!(
                "Provider mismatch: index built with '{}', configured '{}'",
                self.provider, other.provider
            )));
        }

        if self.model != other.model {
            return Err(AppError::Embedding(format!(
                "Model mismatch: index built with '{}', configured '{}'",
                self.model, other.model
            )));
        }

        if self.dimensions != other.dimensions {
            return Err(AppError::Embedding(format!(
                "Dimension mismatch: index built with {}, configured {}",
                self.dimensions, other.dimensions
            )));
        }

        Ok(())
    }
}
