//! Exhaustive vector retrieval over the in-memory working set.
//!
//! The working set is an immutable snapshot swapped wholesale on refresh, so
//! a retrieval running during an ingestion sees either the old or the new
//! set of chunks, never a mix.

use crate::similarity::cosine_similarity;
use crate::types::{KnowledgeChunk, RankedChunk};
use std::sync::{Arc, RwLock};

/// Parameters for one retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub top_k: usize,

    /// Results scoring below this are discarded
    pub threshold: f32,

    pub use_diversity: bool,

    /// A candidate this similar to an accepted result is suppressed
    pub diversity_threshold: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.25,
            use_diversity: true,
            diversity_threshold: 0.95,
        }
    }
}

type Snapshot = Arc<Vec<Arc<KnowledgeChunk>>>;

/// Holds the working set and ranks it against query vectors.
#[derive(Debug, Default)]
pub struct Retriever {
    working_set: RwLock<Snapshot>,
}

impl Retriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the working set.
    pub fn replace(&self, chunks: Vec<KnowledgeChunk>) {
        let snapshot: Snapshot = Arc::new(chunks.into_iter().map(Arc::new).collect());
        let count = snapshot.len();
        match self.working_set.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        tracing::debug!(chunks = count, "Retriever working set replaced");
    }

    /// Current working set.
    pub fn snapshot(&self) -> Snapshot {
        match self.working_set.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank the working set against a query vector.
    pub fn retrieve(&self, query: &[f32], options: &RetrievalOptions) -> Vec<RankedChunk> {
        let snapshot = self.snapshot();
        let results = rank(&snapshot, query, options);
        tracing::debug!(
            candidates = snapshot.len(),
            returned = results.len(),
            top = results.first().map(|r| r.similarity),
            "Retrieval complete"
        );
        results
    }
}

/// Score, filter, sort and diversify `chunks` against `query`.
///
/// Chunks without an embedding are skipped. The result holds at most
/// `top_k` entries in descending similarity order.
pub fn rank(
    chunks: &[Arc<KnowledgeChunk>],
    query: &[f32],
    options: &RetrievalOptions,
) -> Vec<RankedChunk> {
    if options.top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<RankedChunk> = chunks
        .iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_deref()?;
            let similarity = cosine_similarity(query, embedding);
            (similarity >= options.threshold).then(|| RankedChunk {
                chunk: Arc::clone(chunk),
                similarity,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    if !options.use_diversity {
        scored.truncate(options.top_k);
        return scored;
    }

    let mut accepted: Vec<RankedChunk> = Vec::with_capacity(options.top_k);
    for candidate in scored {
        if accepted.len() >= options.top_k {
            break;
        }
        let distinct = accepted.iter().all(|kept| {
            match (kept.chunk.embedding.as_deref(), candidate.chunk.embedding.as_deref()) {
                (Some(a), Some(b)) => cosine_similarity(a, b) < options.diversity_threshold,
                _ => true,
            }
        });
        if distinct {
            accepted.push(candidate);
        } else {
            tracing::trace!(chunk = %candidate.chunk.id, "Suppressed near-duplicate result");
        }
    }

    accepted
}
