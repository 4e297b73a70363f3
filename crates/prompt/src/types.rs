//! Prompt types.

use serde::{Deserialize, Serialize};

/// Built-in answer template.
pub const DEFAULT_ANSWER_TEMPLATE: &str = "{{#if history}}Previous conversation:
{{#each history}}Q: {{this.query}}
A: {{this.answer}}
{{/each}}
{{/if}}Context information:
{{context}}

Question: {{query}}

Please provide a helpful, concise answer based on the context above.";

/// A generation prompt template, loadable from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptTemplate {
    /// Unique template identifier
    pub id: String,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,

    /// System prompt sent alongside the rendered template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Handlebars template; sees `query`, `context` and `history`
    pub template: String,

    /// Most recent conversation turns made available as `history`
    #[serde(rename = "historyTurns", default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_api_version() -> String {
    "1.0".to_string()
}

fn default_history_turns() -> usize {
    3
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            id: "recall.answer.default".to_string(),
            title: "Answer from retrieved context".to_string(),
            api_version: default_api_version(),
            system: None,
            template: DEFAULT_ANSWER_TEMPLATE.to_string(),
            history_turns: default_history_turns(),
        }
    }
}

/// One earlier question and its answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub query: String,
    pub answer: String,
}

impl ConversationTurn {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
        }
    }
}

/// A fully built prompt ready for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Conversation turns actually rendered
    #[serde(rename = "historyTurnsUsed")]
    pub history_turns_used: usize,

    #[serde(rename = "contextChars")]
    pub context_chars: usize,
}
