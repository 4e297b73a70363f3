//! Text normalization helpers shared by ingestion and querying.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).expect("valid URL regex"));

/// Normalize a query into its cache key.
///
/// Lowercases, removes punctuation other than apostrophes, hyphens and
/// underscores, and collapses whitespace.
pub fn normalize_query(query: &str) -> String {
    let lower = query.to_lowercase();
    let kept: String = lower
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '\'' | '-' | '_'))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean raw document text before chunking.
///
/// Control characters are removed and typographic quotes straightened.
/// Whitespace runs without a newline become one space, runs with one
/// newline become a newline, and runs with two or more become a blank line
/// so paragraph boundaries survive.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut pending_newlines = 0usize;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                pending_newlines += 1;
            } else {
                pending_space = true;
            }
            continue;
        }
        if c.is_control() {
            continue;
        }

        if !out.is_empty() {
            match pending_newlines {
                0 if pending_space => out.push(' '),
                0 => {}
                1 => out.push('\n'),
                _ => out.push_str("\n\n"),
            }
        }
        pending_space = false;
        pending_newlines = 0;

        out.push(match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        });
    }

    out
}

/// Extract distinct URLs from text, in order of first appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_PATTERN.find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Truncate to at most `max_chars` characters, appending `marker` when cut.
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}{}", cut.trim_end(), marker)
}

/// SHA-256 checksum of text, hex encoded.
pub fn calculate_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
