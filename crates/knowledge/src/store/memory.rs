//! In-memory [`KnowledgeStore`] for tests and ephemeral engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use recall_core::{AppError, AppResult};

use super::{KnowledgeStore, StoreStats};
use crate::types::{AnswerCacheEntry, DocumentManifest, KnowledgeChunk};

#[derive(Default)]
struct MemoryData {
    /// Chunks keyed by document id, in position order
    chunks: HashMap<String, Vec<KnowledgeChunk>>,
    manifests: HashMap<String, DocumentManifest>,
    answers: HashMap<String, AnswerCacheEntry>,
    meta: HashMap<String, String>,
}

/// Store holding everything in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<MemoryData>,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, MemoryData>> {
        self.ensure_open()?;
        Ok(self.data.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, MemoryData>> {
        self.ensure_open()?;
        Ok(self.data.write().unwrap_or_else(|e| e.into_inner()))
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Storage("Store is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn replace_document(
        &self,
        manifest: &DocumentManifest,
        chunks: &[KnowledgeChunk],
    ) -> AppResult<usize> {
        let mut data = self.write()?;
        let mut sorted = chunks.to_vec();
        sorted.sort_by_key(|c| c.position);
        let removed = data
            .chunks
            .insert(manifest.document_id.clone(), sorted)
            .map(|old| old.len())
            .unwrap_or(0);
        data.manifests
            .insert(manifest.document_id.clone(), manifest.clone());
        Ok(removed)
    }

    async fn all_chunks(&self) -> AppResult<Vec<KnowledgeChunk>> {
        let data = self.read()?;
        let mut document_ids: Vec<&String> = data.chunks.keys().collect();
        document_ids.sort();
        Ok(document_ids
            .into_iter()
            .flat_map(|id| data.chunks[id].iter().cloned())
            .collect())
    }

    async fn chunks_for_document(&self, document_id: &str) -> AppResult<Vec<KnowledgeChunk>> {
        Ok(self
            .read()?
            .chunks
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_manifest(&self, document_id: &str) -> AppResult<Option<DocumentManifest>> {
        Ok(self.read()?.manifests.get(document_id).cloned())
    }

    async fn get_cached_answer(
        &self,
        normalized_query: &str,
    ) -> AppResult<Option<AnswerCacheEntry>> {
        Ok(self.read()?.answers.get(normalized_query).cloned())
    }

    async fn put_cached_answer(&self, entry: &AnswerCacheEntry) -> AppResult<()> {
        self.write()?
            .answers
            .insert(entry.normalized_query.clone(), entry.clone());
        Ok(())
    }

    async fn delete_cached_answers(&self, keys: &[String]) -> AppResult<usize> {
        let mut data = self.write()?;
        Ok(keys
            .iter()
            .filter(|key| data.answers.remove(key.as_str()).is_some())
            .count())
    }

    async fn cached_answers(&self) -> AppResult<Vec<AnswerCacheEntry>> {
        Ok(self.read()?.answers.values().cloned().collect())
    }

    async fn clear_cache(&self) -> AppResult<usize> {
        let mut data = self.write()?;
        let count = data.answers.len();
        data.answers.clear();
        Ok(count)
    }

    async fn get_meta(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.read()?.meta.get(key).cloned())
    }

    async fn put_meta(&self, key: &str, value: &str) -> AppResult<()> {
        self.write()?.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn stats(&self) -> AppResult<StoreStats> {
        let data = self.read()?;
        Ok(StoreStats {
            chunk_count: data.chunks.values().map(Vec::len).sum(),
            document_count: data.manifests.len(),
            cache_entries: data.answers.len(),
        })
    }

    async fn clear_all(&self) -> AppResult<()> {
        *self.write()? = MemoryData::default();
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(document_id: &str, position: u32) -> KnowledgeChunk {
        KnowledgeChunk {
            id: KnowledgeChunk::chunk_id(document_id, position as usize),
            document_id: document_id.to_string(),
            origin: document_id.to_string(),
            position,
            text: format!("{} {}", document_id, position),
            embedding: None,
            metadata: Default::default(),
        }
    }

    fn manifest(document_id: &str, unit_count: usize) -> DocumentManifest {
        DocumentManifest {
            document_id: document_id.to_string(),
            checksum: "abc".to_string(),
            version: 1,
            updated_at: Utc::now(),
            unit_count,
        }
    }

    #[tokio::test]
    async fn test_all_chunks_ordering() {
        let store = InMemoryStore::new();
        store
            .replace_document(&manifest("b", 1), &[chunk("b", 0)])
            .await
            .unwrap();
        store
            .replace_document(&manifest("a", 2), &[chunk("a", 1), chunk("a", 0)])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .all_chunks()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a-chunk-0", "a-chunk-1", "b-chunk-0"]);

        let removed = store
            .replace_document(&manifest("a", 1), &[chunk("a", 0)])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.stats().await.unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = InMemoryStore::new();
        store.close().await.unwrap();
        assert!(matches!(
            store.get_meta("k").await,
            Err(AppError::Storage(_))
        ));
    }
}
