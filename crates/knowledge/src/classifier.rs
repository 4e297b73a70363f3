//! Query intent classification.
//!
//! Decides, before any retrieval happens, whether a query is small talk,
//! something the knowledge base cannot answer, or a real question.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Category of a user query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryType {
    /// Greetings, thanks, acknowledgements
    Conversational,
    /// Time, weather, actions and live data
    OutOfScope,
    /// Phrased as a question
    KnowledgeBase,
    /// Anything else
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Conversational => "conversational",
            QueryType::OutOfScope => "out-of-scope",
            QueryType::KnowledgeBase => "knowledge-base",
            QueryType::General => "general",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence attached to canned conversational replies.
pub const CONVERSATIONAL_CONFIDENCE: f32 = 1.0;

/// Confidence attached to the out-of-scope decline.
pub const OUT_OF_SCOPE_CONFIDENCE: f32 = 0.0;

pub const OUT_OF_SCOPE_RESPONSE: &str = "I'm focused on answering questions about the knowledge base. I can't help with that particular topic, but feel free to ask me anything within my domain!";

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|p| Regex::new(p).expect("valid classifier regex"))
        .collect()
}

static CONVERSATIONAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[
        r"^(hi|hello|hey|greetings|good morning|good afternoon|good evening)\b",
        r"\b(how are you|what's up|whats up)\b",
        r"\b(thanks|thank you|thx|ty)\b",
        r"^(bye|goodbye|see you|farewell)\b",
        r"^(ok|okay|sure|alright|cool|great|awesome)\b",
        r"^(yes|yeah|yep|no|nope|nah)\b",
    ])
});

static OUT_OF_SCOPE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[
        // Time
        r"what time is it",
        r"what'?s the time",
        r"current time",
        r"today'?s date",
        r"what date is it",
        // Weather
        r"weather",
        r"raining",
        r"forecast",
        r"temperature",
        // Actions
        r"send (an? )?(email|message)",
        r"call someone",
        r"make (a )?call",
        r"open (a )?file",
        r"start (a )?program",
        // Live data
        r"stock price",
        r"(current|latest|breaking) news",
    ])
});

static EXPLANATION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[
        r"explain\b",
        r"how does\b",
        r"tell me about\b",
        r"describe\b",
        r"what is (the |a )?.+ (system|concept|theory|principle)",
    ])
});

const QUESTION_WORDS: &[&str] = &[
    "what", "who", "where", "when", "why", "how", "which", "can", "does", "is", "are",
];

/// Classify a raw query.
///
/// Conversational patterns win over out-of-scope ones, which win over the
/// question heuristic. An out-of-scope match turns into a knowledge-base
/// question when the query asks for an explanation ("explain the weather
/// system").
pub fn classify(query: &str) -> QueryType {
    let query = query.trim().to_lowercase();

    if is_conversational(&query) {
        return QueryType::Conversational;
    }

    match scope_check(&query) {
        Scope::OutOfScope => return QueryType::OutOfScope,
        Scope::Explained => return QueryType::KnowledgeBase,
        Scope::Unmatched => {}
    }

    if is_question(&query) {
        return QueryType::KnowledgeBase;
    }

    QueryType::General
}

fn is_conversational(query: &str) -> bool {
    CONVERSATIONAL.iter().any(|p| p.is_match(query))
}

/// Result of matching the out-of-scope patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// No out-of-scope pattern matched
    Unmatched,
    OutOfScope,
    /// An out-of-scope topic, but the query asks for an explanation of it
    Explained,
}

fn scope_check(query: &str) -> Scope {
    if !OUT_OF_SCOPE.iter().any(|p| p.is_match(query)) {
        Scope::Unmatched
    } else if EXPLANATION.iter().any(|p| p.is_match(query)) {
        Scope::Explained
    } else {
        Scope::OutOfScope
    }
}

fn is_question(query: &str) -> bool {
    query.ends_with('?')
        || QUESTION_WORDS
            .iter()
            .any(|word| query.strip_prefix(word).is_some_and(|rest| rest.starts_with(' ')))
}

/// Whether a query of this type may escalate to generation.
pub fn should_generate(query_type: QueryType, generation_enabled: bool) -> bool {
    if !generation_enabled {
        return false;
    }
    matches!(query_type, QueryType::KnowledgeBase | QueryType::General)
}

/// Canned reply for a conversational query.
pub fn conversational_response(query: &str) -> &'static str {
    let query = query.trim().to_lowercase();
    let starts_with_any = |words: &[&str]| {
        words.iter().any(|w| {
            query
                .strip_prefix(w)
                .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric()))
        })
    };

    if starts_with_any(&["hi", "hello", "hey"]) {
        "Hello! How can I help you today?"
    } else if starts_with_any(&["thanks", "thank you"]) {
        "You're welcome! Feel free to ask if you have more questions."
    } else if starts_with_any(&["bye", "goodbye"]) {
        "Goodbye! Have a great day!"
    } else if starts_with_any(&["ok", "okay", "sure", "alright"]) {
        "Great! Anything else I can help with?"
    } else {
        "I'm here to help! What would you like to know?"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversational() {
        for query in ["hello", "Hi there", "thanks a lot", "how are you?", "bye", "ok"] {
            assert_eq!(classify(query), QueryType::Conversational, "{}", query);
        }
    }

    #[test]
    fn test_word_boundaries() {
        // "history" starts with "hi" and contains "ty"
        assert_ne!(classify("history of the borrow checker"), QueryType::Conversational);
        assert_ne!(classify("okra recipes"), QueryType::Conversational);
    }

    #[test]
    fn test_out_of_scope() {
        for query in ["what time is it", "Will it be raining tomorrow", "send an email to Bob", "latest news"] {
            assert_eq!(classify(query), QueryType::OutOfScope, "{}", query);
        }
    }

    #[test]
    fn test_explanation_overrides_out_of_scope() {
        assert_eq!(classify("explain the weather system"), QueryType::KnowledgeBase);
        assert_eq!(classify("describe the forecast pipeline"), QueryType::KnowledgeBase);
        assert_eq!(classify("how does the weather model work?"), QueryType::KnowledgeBase);
        assert_eq!(
            classify("what is the forecast system"),
            QueryType::KnowledgeBase
        );
    }

    #[test]
    fn test_scope_check() {
        assert_eq!(scope_check("ownership rules"), Scope::Unmatched);
        assert_eq!(scope_check("weather today"), Scope::OutOfScope);
        assert_eq!(scope_check("explain the weather system"), Scope::Explained);
    }

    #[test]
    fn test_conversational_wins_over_out_of_scope() {
        assert_eq!(classify("hello, what's the weather"), QueryType::Conversational);
    }

    #[test]
    fn test_question_heuristic() {
        assert_eq!(classify("What is ownership?"), QueryType::KnowledgeBase);
        assert_eq!(classify("does rust have a garbage collector"), QueryType::KnowledgeBase);
        assert_eq!(classify("ownership rules?"), QueryType::KnowledgeBase);
        assert_eq!(classify("ownership rules"), QueryType::General);
        // Question word must be a whole word
        assert_eq!(classify("isolation levels"), QueryType::General);
    }

    #[test]
    fn test_should_generate() {
        assert!(should_generate(QueryType::KnowledgeBase, true));
        assert!(should_generate(QueryType::General, true));
        assert!(!should_generate(QueryType::Conversational, true));
        assert!(!should_generate(QueryType::OutOfScope, true));
        assert!(!should_generate(QueryType::KnowledgeBase, false));
    }

    #[test]
    fn test_conversational_response() {
        assert_eq!(conversational_response("Hello"), "Hello! How can I help you today?");
        assert!(conversational_response("thank you!").starts_with("You're welcome"));
        assert!(conversational_response("goodbye").starts_with("Goodbye"));
        assert!(conversational_response("how are you").starts_with("I'm here to help"));
    }
}
