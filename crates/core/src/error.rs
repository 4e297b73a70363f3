//! Error types for Recall.
//!
//! A single error enum covers configuration, storage, ingestion, retrieval
//! and generation failures. Generation failures are the one category the
//! answering pipeline recovers from locally; see
//! [`AppError::is_generation_failure`].

use thiserror::Error;

/// Unified error type for Recall.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation provider transport or protocol errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge pipeline errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An operation was called before `initialize` completed, or after `destroy`.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Unsupported or malformed ingestion input.
    #[error("Invalid knowledge source: {0}")]
    InvalidSource(String),

    /// Empty or otherwise unusable query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The embedding capability failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A generation call did not finish before its deadline.
    #[error("Generation timed out after {timeout_ms}ms (provider: {provider})")]
    GenerationTimeout { provider: String, timeout_ms: u64 },

    /// No generation provider could be selected.
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Persistent store failure. Always propagated.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// True for errors raised by a generation attempt.
    ///
    /// Callers answering a query keep their extractive answer when they see
    /// one of these instead of failing the request.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            AppError::GenerationTimeout { .. } | AppError::GenerationUnavailable(_) | AppError::Llm(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_failures_are_recoverable() {
        let timeout = AppError::GenerationTimeout {
            provider: "local-model".to_string(),
            timeout_ms: 3000,
        };
        assert!(timeout.is_generation_failure());
        assert!(AppError::GenerationUnavailable("none".to_string()).is_generation_failure());
        assert!(AppError::Llm("connection refused".to_string()).is_generation_failure());

        assert!(!AppError::Storage("disk full".to_string()).is_generation_failure());
        assert!(!AppError::InvalidSource("empty".to_string()).is_generation_failure());
    }

    #[test]
    fn test_timeout_message() {
        let err = AppError::GenerationTimeout {
            provider: "on-device".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(
            err.to_string(),
            "Generation timed out after 5000ms (provider: on-device)"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
