//! Engine configuration management.
//!
//! Pipeline tunables live in `.recall/engine.yaml`. Every field is optional;
//! missing fields take their defaults and out-of-range values are clamped.

use crate::embeddings::EmbeddingConfig;
use recall_core::{AppError, AppResult};
use recall_llm::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline configuration for a knowledge engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Answer cache time-to-live in seconds
    pub cache_ttl_secs: u64,

    /// Maximum number of cached answers
    pub max_cache_entries: usize,

    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,

    /// Chunks shorter than this are dropped (except the last one)
    pub min_chunk_size: usize,

    /// Number of results returned by retrieval
    pub top_k: usize,

    /// Minimum similarity for a chunk to be retrieved
    pub similarity_threshold: f32,

    /// Suppress near-duplicate results
    pub use_diversity: bool,

    /// Results at least this similar to an accepted result are dropped
    pub diversity_threshold: f32,

    /// Maximum sources used by the extractive answer
    pub max_sources: usize,

    /// Top similarity above which a short chunk is returned verbatim
    pub extractive_confidence: f32,

    /// Master switch for generation
    pub generation_enabled: bool,

    /// Only generate when the extractive answer is not good enough
    pub strict_mode: bool,

    /// Confidence at or above which strict mode skips generation
    pub good_enough_confidence: f32,

    /// Minimum top similarity required before generating
    pub min_generation_similarity: f32,

    /// Minimum indexed chunks required before generating
    pub min_chunks_for_generation: usize,

    /// Character cap of the generation context
    pub max_context_chars: usize,

    /// Confidence below which the longer generation timeout applies
    pub low_confidence: f32,

    pub low_confidence_timeout_ms: u64,

    pub default_generation_timeout_ms: u64,

    /// Generated text must be longer than this to replace the extractive answer
    pub min_generated_chars: usize,

    /// Reduce extractive answers to the leading sentence of the top result
    pub single_answer_mode: bool,

    /// Character cap in single-answer mode
    pub answer_length_limit: usize,

    pub embedding: EmbeddingConfig,

    pub generation: GenerationConfig,

    /// Prompt id under `.recall/prompts/`; the built-in template when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 86_400,
            max_cache_entries: 100,
            chunk_size: 900,
            chunk_overlap: 120,
            min_chunk_size: 100,
            top_k: 5,
            similarity_threshold: 0.25,
            use_diversity: true,
            diversity_threshold: 0.95,
            max_sources: 3,
            extractive_confidence: 0.8,
            generation_enabled: true,
            strict_mode: true,
            good_enough_confidence: 0.75,
            min_generation_similarity: 0.55,
            min_chunks_for_generation: 5,
            max_context_chars: 1800,
            low_confidence: 0.5,
            low_confidence_timeout_ms: 5000,
            default_generation_timeout_ms: 3000,
            min_generated_chars: 50,
            single_answer_mode: false,
            answer_length_limit: 320,
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            prompt_template: None,
        }
    }
}

fn clamp_usize(field: &str, value: usize, min: usize, max: usize) -> usize {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(field, value, clamped, "Config value out of range, clamped");
    }
    clamped
}

fn clamp_u64(field: &str, value: u64, min: u64, max: u64) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(field, value, clamped, "Config value out of range, clamped");
    }
    clamped
}

fn clamp_unit(field: &str, value: f32) -> f32 {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    };
    if clamped != value {
        tracing::warn!(field, value, clamped, "Config value out of range, clamped");
    }
    clamped
}

impl EngineConfig {
    /// Return a copy with every bounded field inside its range.
    pub fn clamped(mut self) -> Self {
        self.cache_ttl_secs = clamp_u64("cache_ttl_secs", self.cache_ttl_secs, 60, 604_800);
        self.max_cache_entries =
            clamp_usize("max_cache_entries", self.max_cache_entries, 10, 1000);
        self.chunk_size = clamp_usize("chunk_size", self.chunk_size, 50, 2000);
        self.chunk_overlap = clamp_usize("chunk_overlap", self.chunk_overlap, 0, 500);
        self.min_chunk_size = clamp_usize("min_chunk_size", self.min_chunk_size, 0, self.chunk_size);
        self.top_k = clamp_usize("top_k", self.top_k, 1, 50);
        self.max_sources = clamp_usize("max_sources", self.max_sources, 1, 10);
        self.similarity_threshold = clamp_unit("similarity_threshold", self.similarity_threshold);
        self.diversity_threshold = clamp_unit("diversity_threshold", self.diversity_threshold);
        self.extractive_confidence =
            clamp_unit("extractive_confidence", self.extractive_confidence);
        self.good_enough_confidence =
            clamp_unit("good_enough_confidence", self.good_enough_confidence);
        self.min_generation_similarity =
            clamp_unit("min_generation_similarity", self.min_generation_similarity);
        self.low_confidence = clamp_unit("low_confidence", self.low_confidence);
        self.embedding.batch_size = clamp_usize("embedding.batch_size", self.embedding.batch_size, 1, 256);
        self.embedding.dimensions = clamp_usize("embedding.dimensions", self.embedding.dimensions, 1, 8192);
        self
    }
}

/// Load the engine configuration for a workspace.
///
/// Returns clamped defaults when `.recall/engine.yaml` does not exist.
pub fn load_config(workspace: &Path) -> AppResult<EngineConfig> {
    let config_path = get_config_path(workspace);

    if !config_path.exists() {
        tracing::debug!("Using default engine config (no config file found)");
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let config: EngineConfig = if content.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?
    };

    tracing::debug!("Loaded engine config from {:?}", config_path);
    Ok(config.clamped())
}

/// Save the engine configuration for a workspace.
pub fn save_config(workspace: &Path, config: &EngineConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved engine config to {:?}", config_path);
    Ok(())
}

/// Path of the engine config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".recall").join("engine.yaml")
}

/// Path of the SQLite knowledge store.
pub fn get_index_path(workspace: &Path) -> PathBuf {
    workspace.join(".recall").join("index.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(temp_dir.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.chunk_size, 900);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig {
            top_k: 8,
            strict_mode: false,
            ..Default::default()
        };

        save_config(temp_dir.path(), &config).unwrap();
        let loaded = load_config(temp_dir.path()).unwrap();

        assert_eq!(loaded.top_k, 8);
        assert!(!loaded.strict_mode);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = get_config_path(temp_dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "chunk_size: 400\ngeneration:\n  fallback_order: [local-model]\n").unwrap();

        let config = load_config(temp_dir.path()).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 120);
        assert_eq!(config.generation.fallback_order.len(), 1);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = EngineConfig {
            cache_ttl_secs: 5,
            max_cache_entries: 5000,
            chunk_size: 10,
            chunk_overlap: 900,
            top_k: 0,
            similarity_threshold: 1.5,
            ..Default::default()
        }
        .clamped();

        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.max_cache_entries, 1000);
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.chunk_overlap, 500);
        assert_eq!(config.min_chunk_size, 50);
        assert_eq!(config.top_k, 1);
        assert_eq!(config.similarity_threshold, 1.0);
    }

    #[test]
    fn test_paths() {
        let workspace = Path::new("/tmp/ws");
        assert!(get_config_path(workspace).ends_with(".recall/engine.yaml"));
        assert!(get_index_path(workspace).ends_with(".recall/index.sqlite"));
    }
}
