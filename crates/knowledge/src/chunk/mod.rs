//! Chunking of document text into retrievable units.
//!
//! Text is cleaned, split at paragraph/sentence/whitespace boundaries with
//! overlap, and turned into [`KnowledgeChunk`]s carrying deterministic ids
//! and traceability metadata.

mod splitter;

pub use splitter::{split, ChunkDraft, BOUNDARY_WINDOW};

use crate::normalize::clean_text;
use crate::types::{KnowledgeChunk, Metadata};
use serde_json::json;

/// Configuration for the chunker.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between chunks in characters
    pub overlap: usize,

    /// Minimum chunk size (smaller chunks are skipped, except the last)
    pub min_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            overlap: 120,
            min_size: 100,
        }
    }
}

/// Clean and split text into drafts.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<ChunkDraft> {
    split(&clean_text(text), config)
}

/// Chunk a document into retrievable units without embeddings.
///
/// Each chunk gets id `{document_id}-chunk-{i}`, origin `{origin}#chunk-{i}`
/// and metadata `chunk_index`, `total_chunks`, `char_start`, `char_end`
/// merged over the caller's metadata.
pub fn create_chunks(
    document_id: &str,
    origin: &str,
    text: &str,
    config: &ChunkConfig,
    metadata: &Metadata,
) -> Vec<KnowledgeChunk> {
    let drafts = chunk_text(text, config);
    let total = drafts.len();

    let chunks: Vec<KnowledgeChunk> = drafts
        .into_iter()
        .map(|draft| {
            let mut chunk_metadata = metadata.clone();
            chunk_metadata.insert("chunk_index".to_string(), json!(draft.index));
            chunk_metadata.insert("total_chunks".to_string(), json!(total));
            chunk_metadata.insert("char_start".to_string(), json!(draft.start));
            chunk_metadata.insert("char_end".to_string(), json!(draft.end));

            KnowledgeChunk {
                id: KnowledgeChunk::chunk_id(document_id, draft.index),
                document_id: document_id.to_string(),
                origin: format!("{}#chunk-{}", origin, draft.index),
                position: draft.index as u32,
                text: draft.text,
                embedding: None,
                metadata: chunk_metadata,
            }
        })
        .collect();

    tracing::debug!(
        document_id,
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        overlap = config.overlap,
        "Chunked document"
    );

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_short_text() {
        let drafts = chunk_text("Short text", &ChunkConfig::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "Short text");
    }

    #[test]
    fn test_chunk_text_cleans_first() {
        let drafts = chunk_text("  Short \t\t text  ", &ChunkConfig::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "Short text");
    }

    #[test]
    fn test_create_chunks_ids_and_metadata() {
        let text = "Ownership is a set of rules that govern memory. ".repeat(60);
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), json!("The Book"));

        let chunks = create_chunks("rust-book", "book.md", &text, &ChunkConfig::default(), &metadata);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("rust-book-chunk-{}", i));
            assert_eq!(chunk.origin, format!("book.md#chunk-{}", i));
            assert_eq!(chunk.position as usize, i);
            assert_eq!(chunk.document_id, "rust-book");
            assert!(chunk.embedding.is_none());
            assert_eq!(chunk.metadata["chunk_index"], json!(i));
            assert_eq!(chunk.metadata["total_chunks"], json!(chunks.len()));
            assert_eq!(chunk.title(), Some("The Book"));
        }
    }

    #[test]
    fn test_create_chunks_is_deterministic() {
        let text = "Paragraph one about caching.\n\nParagraph two about retrieval. ".repeat(40);
        let a = create_chunks("doc", "doc", &text, &ChunkConfig::default(), &Metadata::new());
        let b = create_chunks("doc", "doc", &text, &ChunkConfig::default(), &Metadata::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_create_chunks_empty_text() {
        let chunks = create_chunks("doc", "doc", "   \n\n  ", &ChunkConfig::default(), &Metadata::new());
        assert!(chunks.is_empty());
    }
}
