//! Greedy boundary-seeking text splitter.

use super::ChunkConfig;

/// Characters searched on each side of the ideal chunk end.
pub const BOUNDARY_WINDOW: usize = 100;

const PARAGRAPH_BOUNDARIES: &[&str] = &["\n\n"];
const SENTENCE_BOUNDARIES: &[&str] = &[". ", "! ", "? ", ".\n", "!\n", "?\n"];

/// A span of text produced by [`split`], before ids and embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    /// Ordinal position among the kept drafts
    pub index: usize,

    /// Trimmed span text
    pub text: String,

    /// Character offset where the scanned span starts
    pub start: usize,

    /// Character offset one past the scanned span end
    pub end: usize,
}

/// Split `text` into overlapping drafts.
///
/// Text no longer than `chunk_size` characters is returned as a single
/// draft. Otherwise each step ends at the best boundary near
/// `start + chunk_size`, and the next step starts `overlap` characters
/// before that end, never at or before the current start. Drafts shorter
/// than `min_size` are dropped unless they are the last one.
pub fn split(text: &str, config: &ChunkConfig) -> Vec<ChunkDraft> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let chunk_size = config.chunk_size.max(1);

    if len == 0 {
        return Vec::new();
    }

    if len <= chunk_size {
        return vec![ChunkDraft {
            index: 0,
            text: text.to_string(),
            start: 0,
            end: len,
        }];
    }

    let mut drafts = Vec::new();
    let mut start = 0;

    while start < len {
        let ideal_end = start + chunk_size;
        let is_last = ideal_end >= len;
        let end = if is_last {
            len
        } else {
            find_break(&chars, start, ideal_end)
        };

        let span: String = chars[start..end].iter().collect();
        let trimmed = span.trim();
        let reached_end = end >= len;

        if !trimmed.is_empty() && (reached_end || trimmed.chars().count() >= config.min_size) {
            drafts.push(ChunkDraft {
                index: drafts.len(),
                text: trimmed.to_string(),
                start,
                end,
            });
        } else {
            tracing::trace!(start, end, "Dropping undersized chunk");
        }

        if reached_end {
            break;
        }

        let next = end.saturating_sub(config.overlap);
        start = if next <= start { end } else { next };
    }

    drafts
}

/// Pick the end offset for a span starting at `start`.
///
/// Searches `ideal_end ± BOUNDARY_WINDOW` for a paragraph break, then a
/// sentence end, then any whitespace, taking the rightmost match of the
/// first kind found. A match must lie past the first third of the window.
fn find_break(chars: &[char], start: usize, ideal_end: usize) -> usize {
    let window_start = ideal_end.saturating_sub(BOUNDARY_WINDOW).max(start);
    let window_end = (ideal_end + BOUNDARY_WINDOW).min(chars.len());
    let window = &chars[window_start..window_end];
    let min_offset = window.len() / 3;

    for group in [PARAGRAPH_BOUNDARIES, SENTENCE_BOUNDARIES] {
        let best = group
            .iter()
            .filter_map(|pattern| rfind(window, pattern))
            .filter(|(offset, _)| *offset > min_offset)
            .map(|(offset, width)| offset + width)
            .max();
        if let Some(end) = best {
            return window_start + end;
        }
    }

    if let Some(offset) = window.iter().rposition(|c| c.is_whitespace()) {
        if offset > min_offset {
            return window_start + offset + 1;
        }
    }

    ideal_end
}

/// Last occurrence of `needle` in `haystack`, as (offset, needle width).
fn rfind(haystack: &[char], needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == needle[..])
        .map(|i| (i, needle.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize, min_size: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            overlap,
            min_size,
        }
    }

    fn sentences(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {} talks about retrieval quality.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_text_single_draft() {
        let drafts = split("Short text", &ChunkConfig::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "Short text");
        assert_eq!((drafts[0].start, drafts[0].end), (0, 10));
    }

    #[test]
    fn test_empty_text_no_drafts() {
        assert!(split("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let text = sentences(40);
        let drafts = split(&text, &config(300, 50, 20));

        assert!(drafts.len() > 1);
        for draft in &drafts[..drafts.len() - 1] {
            assert!(draft.text.ends_with('.'), "draft should end at a sentence: {:?}", draft.text);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let first = "a".repeat(280);
        let second = "word ".repeat(100);
        let text = format!("{}\n\n{}", first, second);
        let drafts = split(&text, &config(300, 0, 10));

        assert_eq!(drafts[0].text, first);
        assert_eq!(drafts[0].end, 282);
    }

    #[test]
    fn test_falls_back_to_ideal_end_without_boundaries() {
        let text = "x".repeat(1000);
        let drafts = split(&text, &config(300, 0, 10));

        assert_eq!(drafts[0].end, 300);
        assert_eq!(drafts.last().unwrap().end, 1000);
    }

    #[test]
    fn test_coverage_has_no_gaps() {
        let text = sentences(60);
        let chars: Vec<char> = text.chars().collect();
        let drafts = split(&text, &config(250, 40, 1));

        assert_eq!(drafts[0].start, 0);
        assert_eq!(drafts.last().unwrap().end, chars.len());
        for pair in drafts.windows(2) {
            assert!(pair[1].start <= pair[0].end, "gap between drafts");
            assert!(pair[1].start > pair[0].start, "scan must move forward");
        }
        for draft in &drafts {
            let span: String = chars[draft.start..draft.end].iter().collect();
            assert_eq!(draft.text, span.trim());
        }
    }

    #[test]
    fn test_overlap_larger_than_chunk_terminates() {
        let text = sentences(30);
        let drafts = split(&text, &config(100, 500, 1));

        assert!(!drafts.is_empty());
        for pair in drafts.windows(2) {
            assert!(pair[1].start >= pair[0].end);
        }
    }

    #[test]
    fn test_drops_small_drafts_except_last() {
        let text = format!("{}\n\ntail", "b".repeat(120));
        let drafts = split(&text, &config(100, 0, 50));

        // The trailing "tail" is below min_size but kept as the final draft
        assert_eq!(drafts.last().unwrap().text, "tail");
        for draft in &drafts[..drafts.len() - 1] {
            assert!(draft.text.chars().count() >= 50);
        }
    }

    #[test]
    fn test_indices_are_contiguous() {
        let drafts = split(&sentences(50), &config(200, 30, 10));
        for (i, draft) in drafts.iter().enumerate() {
            assert_eq!(draft.index, i);
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Ünïcödé sëntence wïth áccents. ".repeat(40);
        let drafts = split(&text, &config(120, 20, 10));
        assert!(drafts.len() > 1);
        assert!(drafts.iter().all(|d| !d.text.is_empty()));
    }
}
