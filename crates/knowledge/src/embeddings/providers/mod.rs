//! Embedding provider implementations.

pub mod hashing;
pub mod ollama;

pub use hashing::HashingProvider;
pub use ollama::OllamaProvider;
