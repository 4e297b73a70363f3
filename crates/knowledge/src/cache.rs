//! TTL and capacity bounded answer cache on top of a [`KnowledgeStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use recall_core::AppResult;

use crate::store::KnowledgeStore;
use crate::types::{Answer, AnswerCacheEntry};

/// Answers keyed by normalized query.
pub struct AnswerCache {
    store: Arc<dyn KnowledgeStore>,
    ttl: chrono::Duration,
    max_entries: usize,
}

impl AnswerCache {
    pub fn new(store: Arc<dyn KnowledgeStore>, ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            store,
            ttl: chrono::Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
            max_entries: max_entries.max(1),
        }
    }

    fn is_expired(&self, entry: &AnswerCacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at > self.ttl
    }

    /// Fresh cached answer for `key`. An expired entry is deleted.
    pub async fn lookup(&self, key: &str) -> AppResult<Option<Answer>> {
        let Some(entry) = self.store.get_cached_answer(key).await? else {
            return Ok(None);
        };

        if self.is_expired(&entry, Utc::now()) {
            tracing::debug!(key, "Cached answer expired");
            self.store.delete_cached_answers(&[key.to_string()]).await?;
            return Ok(None);
        }

        Ok(Some(entry.answer))
    }

    /// Store `answer` under `key`, then evict the oldest entries beyond capacity.
    pub async fn insert(&self, key: &str, answer: &Answer) -> AppResult<()> {
        self.store
            .put_cached_answer(&AnswerCacheEntry {
                normalized_query: key.to_string(),
                answer: answer.clone(),
                created_at: Utc::now(),
            })
            .await?;
        self.enforce_capacity().await?;
        Ok(())
    }

    /// Delete entries older than the TTL. Returns how many were removed.
    pub async fn evict_expired(&self) -> AppResult<usize> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .store
            .cached_answers()
            .await?
            .into_iter()
            .filter(|entry| self.is_expired(entry, now))
            .map(|entry| entry.normalized_query)
            .collect();

        let removed = self.store.delete_cached_answers(&expired).await?;
        if removed > 0 {
            tracing::debug!(removed, "Evicted expired cached answers");
        }
        Ok(removed)
    }

    /// Delete the oldest entries until at most `max_entries` remain.
    pub async fn enforce_capacity(&self) -> AppResult<usize> {
        let mut entries = self.store.cached_answers().await?;
        if entries.len() <= self.max_entries {
            return Ok(0);
        }

        entries.sort_by_key(|entry| entry.created_at);
        let excess = entries.len() - self.max_entries;
        let oldest: Vec<String> = entries
            .into_iter()
            .take(excess)
            .map(|entry| entry.normalized_query)
            .collect();

        let removed = self.store.delete_cached_answers(&oldest).await?;
        tracing::debug!(removed, max = self.max_entries, "Answer cache over capacity");
        Ok(removed)
    }

    pub async fn clear(&self) -> AppResult<usize> {
        self.store.clear_cache().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::QueryType;
    use crate::store::InMemoryStore;
    use crate::types::{AnswerRoute, AnswerTiming};

    fn answer(text: &str) -> Answer {
        Answer {
            text: text.to_string(),
            sources: Vec::new(),
            confidence: 0.7,
            timing: AnswerTiming::default(),
            provider: None,
            query_type: QueryType::KnowledgeBase,
            route: AnswerRoute::Generated,
        }
    }

    async fn put_aged(store: &InMemoryStore, key: &str, age_secs: i64) {
        store
            .put_cached_answer(&AnswerCacheEntry {
                normalized_query: key.to_string(),
                answer: answer(key),
                created_at: Utc::now() - chrono::Duration::seconds(age_secs),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lookup_hit_and_miss() {
        let store = Arc::new(InMemoryStore::new());
        let cache = AnswerCache::new(store, 3600, 100);

        cache.insert("what is rust", &answer("Rust")).await.unwrap();
        assert_eq!(cache.lookup("what is rust").await.unwrap(), Some(answer("Rust")));
        assert_eq!(cache.lookup("what is go").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped_on_lookup() {
        let store = Arc::new(InMemoryStore::new());
        put_aged(&store, "stale", 120).await;

        let cache = AnswerCache::new(store.clone(), 60, 100);
        assert_eq!(cache.lookup("stale").await.unwrap(), None);
        assert!(store.get_cached_answer("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = Arc::new(InMemoryStore::new());
        put_aged(&store, "old", 500).await;
        put_aged(&store, "older", 900).await;
        put_aged(&store, "fresh", 10).await;

        let cache = AnswerCache::new(store.clone(), 300, 100);
        assert_eq!(cache.evict_expired().await.unwrap(), 2);
        assert_eq!(store.stats().await.unwrap().cache_entries, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = Arc::new(InMemoryStore::new());
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            put_aged(&store, key, 100 - i as i64).await;
        }

        let cache = AnswerCache::new(store.clone(), 3600, 3);
        cache.insert("e", &answer("e")).await.unwrap();

        let mut keys: Vec<String> = store
            .cached_answers()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.normalized_query)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["c", "d", "e"]);
    }
}
