//! Local knowledge engine: ingestion, retrieval and grounded answers.
//!
//! Documents are cleaned, chunked, embedded and stored in SQLite. Questions
//! are classified, answered extractively from the closest chunks and, when
//! the gating rules allow it, rewritten by a generation provider. Answers
//! are cached per normalized query.
//!
//! ```no_run
//! # async fn run() -> recall_core::AppResult<()> {
//! use recall_knowledge::{AskOptions, KnowledgeEngine, KnowledgeSource};
//!
//! let engine = KnowledgeEngine::open(std::path::Path::new("."))?;
//! engine.initialize().await?;
//! engine
//!     .load_knowledge(KnowledgeSource::text("Cargo is the Rust package manager."))
//!     .await?;
//! let answer = engine.ask("What is cargo?", AskOptions::default()).await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chunk;
pub mod classifier;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod normalize;
pub mod progress;
pub mod retriever;
pub mod similarity;
pub mod sources;
pub mod store;
pub mod synthesizer;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use classifier::QueryType;
pub use config::{load_config, save_config, EngineConfig};
pub use engine::{EngineState, EngineStatus, KnowledgeEngine};
pub use progress::{ProgressEvent, ProgressStage};
pub use sources::KnowledgeSource;
pub use store::{InMemoryStore, KnowledgeStore, SqliteStore, StoreStats};
pub use types::{
    Answer, AnswerRoute, AnswerTiming, AskOptions, DocumentManifest, IngestReport, IngestStatus,
    KnowledgeChunk, SkipReason, SourceRef,
};
