//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use recall_llm::ProviderId;
use recall_prompt::ConversationTurn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::QueryType;

/// Free-form metadata attached to chunks and sources.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Maximum preview length of a source reference, in characters.
pub const SOURCE_PREVIEW_CHARS: usize = 200;

/// A retrievable unit of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Unique chunk identifier, derived from document id and position
    pub id: String,

    /// Owning document
    pub document_id: String,

    /// Human-readable origin label (e.g. `guide.md#chunk-2`)
    pub origin: String,

    /// Position within the document
    pub position: u32,

    /// Text content
    pub text: String,

    /// Embedding vector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Metadata (chunk index, total chunks, source title/url, ...)
    #[serde(default)]
    pub metadata: Metadata,
}

impl KnowledgeChunk {
    /// Deterministic chunk id for a document position.
    pub fn chunk_id(document_id: &str, position: usize) -> String {
        format!("{}-chunk-{}", document_id, position)
    }

    /// Title recorded in the chunk metadata, if any.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }

    /// Source URL recorded in the chunk metadata, if any.
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").and_then(|v| v.as_str())
    }
}

/// Version record for one ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentManifest {
    pub document_id: String,

    /// SHA-256 of the normalized document text
    pub checksum: String,

    /// Incremented on every content change
    pub version: u32,

    pub updated_at: DateTime<Utc>,

    pub unit_count: usize,
}

/// A chunk scored against a query.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Arc<KnowledgeChunk>,
    pub similarity: f32,
}

/// Projection of a chunk shown alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Leading characters of the chunk text
    pub preview: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub similarity: f32,
}

impl SourceRef {
    pub fn from_ranked(ranked: &RankedChunk) -> Self {
        let chunk = &ranked.chunk;
        Self {
            id: chunk.id.clone(),
            title: chunk.title().map(str::to_string),
            preview: chunk.text.chars().take(SOURCE_PREVIEW_CHARS).collect(),
            url: chunk.url().map(str::to_string),
            similarity: ranked.similarity,
        }
    }
}

/// Wall-clock breakdown of an `ask` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerTiming {
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

/// Why generation was not attempted for an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Generation disabled by the caller or the engine config
    DisabledByCaller,
    /// The classifier does not permit generation for this query type
    QueryType { query_type: QueryType },
    /// No generation provider is registered
    NoGenerator,
    /// Retrieval returned nothing
    NoResults,
    /// The knowledge base is too small for generation to be worthwhile
    TooFewChunks { available: usize, required: usize },
    /// The best match is too weak to ground a generated answer
    LowSimilarity { top: f32, required: f32 },
    /// Strict mode and the extractive answer is already good enough
    ConfidentEnough { confidence: f32, threshold: f32 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DisabledByCaller => write!(f, "generation disabled"),
            SkipReason::QueryType { query_type } => {
                write!(f, "query type {} does not use generation", query_type)
            }
            SkipReason::NoGenerator => write!(f, "no generation provider configured"),
            SkipReason::NoResults => write!(f, "no retrieval results"),
            SkipReason::TooFewChunks {
                available,
                required,
            } => write!(f, "{} chunks indexed, {} required", available, required),
            SkipReason::LowSimilarity { top, required } => {
                write!(f, "top similarity {:.3} below {:.3}", top, required)
            }
            SkipReason::ConfidentEnough {
                confidence,
                threshold,
            } => write!(
                f,
                "confidence {:.3} already at or above {:.3}",
                confidence, threshold
            ),
        }
    }
}

/// How an answer was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum AnswerRoute {
    /// Canned reply to a greeting, thanks, ...
    Conversational,
    /// Canned decline
    OutOfScope,
    /// Extractive answer; generation was not attempted
    Extractive { skip: SkipReason },
    /// Generated answer
    Generated,
    /// Generation was attempted but the extractive answer was kept
    GenerationFailed { reason: String },
}

/// Answer returned by `ask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,

    /// In `[0, 1]`
    pub confidence: f32,

    pub timing: AnswerTiming,

    /// Provider that generated the text, if generation was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,

    pub query_type: QueryType,

    pub route: AnswerRoute,
}

/// Cached answer keyed by normalized query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCacheEntry {
    pub normalized_query: String,
    pub answer: Answer,
    pub created_at: DateTime<Utc>,
}

/// Per-call options for `ask`.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Overrides the configured result count
    pub top_k: Option<usize>,

    /// `Some(false)` forbids generation for this call
    pub allow_generation: Option<bool>,

    /// Overrides the confidence-derived generation timeout
    pub timeout: Option<Duration>,

    /// Earlier turns of the conversation, oldest first
    pub history: Vec<ConversationTurn>,
}

/// Outcome of one `load_knowledge` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Content changed (or is new) and was indexed
    Indexed,
    /// Checksum matched the stored manifest; nothing was written
    Unchanged,
}

/// Statistics for one `load_knowledge` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub status: IngestStatus,
    pub unit_count: usize,
    pub version: u32,
    pub checksum: String,
    pub duration_secs: f64,
}
