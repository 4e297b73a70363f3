//! Persistent storage for chunks, document manifests and cached answers.
//!
//! The [`KnowledgeStore`] trait is the only way the engine touches durable
//! state. Storage failures are fatal to the calling operation and are
//! always propagated.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`replace_document`](KnowledgeStore::replace_document) | Atomically swap a document's chunks and manifest |
//! | [`all_chunks`](KnowledgeStore::all_chunks) | Full scan used to build the retriever working set |
//! | [`chunks_for_document`](KnowledgeStore::chunks_for_document) | Secondary index lookup by document id |
//! | [`get_manifest`](KnowledgeStore::get_manifest) | Version record for change detection |
//! | [`get_cached_answer`](KnowledgeStore::get_cached_answer) | Answer cache lookup |
//! | [`cached_answers`](KnowledgeStore::cached_answers) | Answer cache scan for eviction |

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use recall_core::AppResult;
use serde::Serialize;

use crate::types::{AnswerCacheEntry, DocumentManifest, KnowledgeChunk};

/// Row counts of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub document_count: usize,
    pub cache_entries: usize,
}

/// Abstract storage backend for the knowledge engine.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Backend name for logs and status output.
    fn backend(&self) -> &str;

    /// Delete every chunk of `manifest.document_id`, insert `chunks` and
    /// write the manifest, in one transaction. Returns the number of chunks
    /// removed.
    async fn replace_document(
        &self,
        manifest: &DocumentManifest,
        chunks: &[KnowledgeChunk],
    ) -> AppResult<usize>;

    /// All chunks, ordered by document id then position.
    async fn all_chunks(&self) -> AppResult<Vec<KnowledgeChunk>>;

    /// Chunks of one document, ordered by position.
    async fn chunks_for_document(&self, document_id: &str) -> AppResult<Vec<KnowledgeChunk>>;

    async fn get_manifest(&self, document_id: &str) -> AppResult<Option<DocumentManifest>>;

    async fn get_cached_answer(&self, normalized_query: &str)
        -> AppResult<Option<AnswerCacheEntry>>;

    /// Insert or overwrite a cached answer.
    async fn put_cached_answer(&self, entry: &AnswerCacheEntry) -> AppResult<()>;

    /// Delete cached answers by key. Returns how many existed.
    async fn delete_cached_answers(&self, keys: &[String]) -> AppResult<usize>;

    /// Every cached answer.
    async fn cached_answers(&self) -> AppResult<Vec<AnswerCacheEntry>>;

    /// Drop the whole answer cache. Returns how many entries existed.
    async fn clear_cache(&self) -> AppResult<usize>;

    /// Read a value from the key-value metadata table.
    async fn get_meta(&self, key: &str) -> AppResult<Option<String>>;

    async fn put_meta(&self, key: &str, value: &str) -> AppResult<()>;

    async fn stats(&self) -> AppResult<StoreStats>;

    /// Delete chunks, manifests, cached answers and metadata.
    async fn clear_all(&self) -> AppResult<()>;

    /// Release the backend. Later calls fail with a storage error.
    async fn close(&self) -> AppResult<()>;
}
