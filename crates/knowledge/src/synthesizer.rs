//! Extractive answer synthesis from ranked chunks.

use crate::normalize::{extract_urls, truncate_chars};
use crate::types::{RankedChunk, SourceRef};

pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer that question.";

/// Longest chunk text returned verbatim as a direct answer.
pub const DIRECT_ANSWER_MAX_CHARS: usize = 220;

/// Character budget of each focused snippet.
pub const SNIPPET_MAX_CHARS: usize = 240;

/// Character budget of the merged multi-source answer.
pub const MERGED_MAX_CHARS: usize = 700;

/// Maximum links appended to an answer.
pub const MAX_RELATED_LINKS: usize = 5;

/// Number of top results averaged into the confidence score.
const CONFIDENCE_SAMPLE: usize = 3;

const KEYWORD_STOP_WORDS: &[&str] = &[
    "what", "is", "the", "a", "an", "of", "in", "for", "to", "and", "define", "explain", "who",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOptions {
    pub max_sources: usize,

    /// Top similarity needed for a direct extractive answer
    pub confidence_threshold: f32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            max_sources: 3,
            confidence_threshold: 0.8,
        }
    }
}

/// Extractive answer with its sources and confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
}

/// Build an extractive answer from ranked results.
///
/// A short, highly similar top result is returned verbatim. Otherwise the
/// sentence most relevant to the query's primary keyword is taken from each
/// of the top `max_sources` results, deduplicated and merged.
pub fn synthesize(query: &str, results: &[RankedChunk], options: &SynthesisOptions) -> Synthesis {
    let Some(top) = results.first() else {
        return Synthesis {
            text: INSUFFICIENT_INFORMATION.to_string(),
            sources: Vec::new(),
            confidence: 0.0,
        };
    };

    let confidence = confidence(results);

    let direct = top.chunk.text.trim();
    if top.similarity >= options.confidence_threshold
        && direct.chars().count() <= DIRECT_ANSWER_MAX_CHARS
    {
        tracing::debug!(chunk = %top.chunk.id, similarity = top.similarity, "Direct extractive answer");
        return Synthesis {
            text: direct.to_string(),
            sources: vec![SourceRef::from_ranked(top)],
            confidence,
        };
    }

    let selected = &results[..results.len().min(options.max_sources.max(1))];
    let keyword = primary_keyword(query);

    let mut snippets: Vec<String> = Vec::with_capacity(selected.len());
    for ranked in selected {
        let snippet = focused_snippet(&ranked.chunk.text, keyword.as_deref(), SNIPPET_MAX_CHARS);
        if !snippet.is_empty() && !snippets.contains(&snippet) {
            snippets.push(snippet);
        }
    }

    let text = truncate_chars(&snippets.join("\n\n"), MERGED_MAX_CHARS, "…");

    Synthesis {
        text,
        sources: selected.iter().map(SourceRef::from_ranked).collect(),
        confidence,
    }
}

/// Mean similarity of the top results, clamped to `[0, 1]`.
pub fn confidence(results: &[RankedChunk]) -> f32 {
    let sample = &results[..results.len().min(CONFIDENCE_SAMPLE)];
    if sample.is_empty() {
        return 0.0;
    }
    let mean = sample.iter().map(|r| r.similarity).sum::<f32>() / sample.len() as f32;
    mean.clamp(0.0, 1.0)
}

/// First query token that is not a question or filler word.
pub fn primary_keyword(query: &str) -> Option<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let mut tokens = cleaned.split_whitespace();
    let first = tokens.clone().next();
    tokens
        .find(|t| !KEYWORD_STOP_WORDS.contains(t))
        .or(first)
        .map(str::to_string)
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = flat.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek() == Some(&' ') {
            chars.next();
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// The first sentence mentioning `keyword`, else the first sentence,
/// capped at `max_chars`.
pub fn focused_snippet(text: &str, keyword: Option<&str>, max_chars: usize) -> String {
    let sentences = split_sentences(text);
    let chosen = keyword
        .filter(|k| !k.is_empty())
        .and_then(|k| sentences.iter().find(|s| s.to_lowercase().contains(k)))
        .or_else(|| sentences.first());

    match chosen {
        Some(sentence) => truncate_chars(sentence, max_chars, "…"),
        None => truncate_chars(text.trim(), max_chars, "…"),
    }
}

/// Leading sentence of the top result, capped at `limit` characters.
pub fn single_answer(results: &[RankedChunk], limit: usize) -> Option<String> {
    let top = results.first()?;
    let first = split_sentences(&top.chunk.text).into_iter().next()?;
    Some(truncate_chars(&first, limit, "…"))
}

/// URLs found in the result texts and their metadata, deduplicated.
pub fn related_links(results: &[RankedChunk]) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for ranked in results {
        let candidates = extract_urls(&ranked.chunk.text)
            .into_iter()
            .chain(ranked.chunk.url().map(str::to_string));
        for url in candidates {
            if !links.contains(&url) {
                links.push(url);
            }
        }
    }
    links
}

/// Append a "Related links" section listing up to five links.
pub fn format_answer(text: &str, links: &[String]) -> String {
    if links.is_empty() {
        return text.to_string();
    }
    let list = links
        .iter()
        .take(MAX_RELATED_LINKS)
        .map(|url| format!("- {}", url))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\n**Related links:**\n{}", text, list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KnowledgeChunk, Metadata};
    use std::sync::Arc;

    fn ranked(id: &str, text: &str, similarity: f32) -> RankedChunk {
        RankedChunk {
            chunk: Arc::new(KnowledgeChunk {
                id: id.to_string(),
                document_id: "doc".to_string(),
                origin: "doc".to_string(),
                position: 0,
                text: text.to_string(),
                embedding: None,
                metadata: Metadata::new(),
            }),
            similarity,
        }
    }

    #[test]
    fn test_empty_results() {
        let synthesis = synthesize("anything", &[], &SynthesisOptions::default());
        assert_eq!(synthesis.text, INSUFFICIENT_INFORMATION);
        assert!(synthesis.sources.is_empty());
        assert_eq!(synthesis.confidence, 0.0);
    }

    #[test]
    fn test_direct_answer_for_short_confident_match() {
        let results = vec![
            ranked("a", "  Rust is a systems programming language.  ", 0.9),
            ranked("b", "Something else entirely.", 0.4),
        ];
        let synthesis = synthesize("what is rust", &results, &SynthesisOptions::default());

        assert_eq!(synthesis.text, "Rust is a systems programming language.");
        assert_eq!(synthesis.sources.len(), 1);
        assert_eq!(synthesis.sources[0].id, "a");
        assert!((synthesis.confidence - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_is_mean_of_top_three() {
        let results = vec![
            ranked("a", "x", 0.9),
            ranked("b", "y", 0.6),
            ranked("c", "z", 0.3),
            ranked("d", "w", 0.0),
        ];
        assert!((confidence(&results) - 0.6).abs() < 1e-6);
        assert!((confidence(&results[..1]) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_multi_source_focused_snippets() {
        let results = vec![
            ranked(
                "a",
                "Memory is managed manually in C. Ownership gives Rust memory safety. It is checked at compile time.",
                0.7,
            ),
            ranked("b", "The borrow checker enforces ownership. Borrowing is temporary.", 0.6),
            ranked("c", "Ownership gives Rust memory safety. Repeated text.", 0.5),
            ranked("d", "Never used because of max_sources.", 0.45),
        ];
        let synthesis = synthesize("explain ownership", &results, &SynthesisOptions::default());

        assert_eq!(
            synthesis.text,
            "Ownership gives Rust memory safety.\n\nThe borrow checker enforces ownership."
        );
        assert_eq!(synthesis.sources.len(), 3);
        assert!(!synthesis.text.contains("Never used"));
    }

    #[test]
    fn test_long_top_result_is_not_direct() {
        let long = format!("Caching matters. {}", "Filler sentence here. ".repeat(20));
        let results = vec![ranked("a", &long, 0.95)];
        let synthesis = synthesize("why caching", &results, &SynthesisOptions::default());
        assert_eq!(synthesis.text, "Caching matters.");
    }

    #[test]
    fn test_merged_text_is_capped() {
        let sentence = format!("{}.", "keyword ".repeat(40).trim_end());
        let results: Vec<RankedChunk> = (0..3)
            .map(|i| ranked(&i.to_string(), &format!("{} variant {}.", sentence, i), 0.5))
            .collect();
        let options = SynthesisOptions {
            max_sources: 3,
            confidence_threshold: 0.8,
        };
        let synthesis = synthesize("keyword", &results, &options);
        assert!(synthesis.text.chars().count() <= MERGED_MAX_CHARS + 1);
    }

    #[test]
    fn test_primary_keyword() {
        assert_eq!(primary_keyword("What is the borrow checker?").as_deref(), Some("borrow"));
        assert_eq!(primary_keyword("what is").as_deref(), Some("what"));
        assert_eq!(primary_keyword("").as_deref(), None);
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One.  Two!\nThree? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("v1.2 is out."), vec!["v1.2 is out."]);
    }

    #[test]
    fn test_single_answer() {
        let results = vec![ranked("a", "First sentence here. Second one.", 0.5)];
        assert_eq!(single_answer(&results, 320).as_deref(), Some("First sentence here."));
        assert_eq!(single_answer(&results, 5).as_deref(), Some("First…"));
        assert!(single_answer(&[], 320).is_none());
    }

    #[test]
    fn test_related_links_and_format() {
        let mut with_url = ranked("a", "Docs at https://doc.rust-lang.org/book/.", 0.5);
        Arc::make_mut(&mut with_url.chunk)
            .metadata
            .insert("url".to_string(), serde_json::json!("https://example.com/source"));
        let results = vec![with_url, ranked("b", "Again https://doc.rust-lang.org/book/", 0.4)];

        let links = related_links(&results);
        assert_eq!(
            links,
            vec!["https://doc.rust-lang.org/book/", "https://example.com/source"]
        );

        let formatted = format_answer("Answer.", &links);
        assert_eq!(
            formatted,
            "Answer.\n\n**Related links:**\n- https://doc.rust-lang.org/book/\n- https://example.com/source"
        );
        assert_eq!(format_answer("Answer.", &[]), "Answer.");
    }
}
