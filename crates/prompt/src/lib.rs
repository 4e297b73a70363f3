//! Prompt templates for Recall.
//!
//! Generation prompts are Handlebars templates rendered with the question,
//! the retrieved context and recent conversation turns. A built-in template
//! is always available; workspaces can override it with a YAML file.

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_answer_prompt, render_template};
pub use loader::{load_prompt, load_template};
pub use types::{BuiltPrompt, BuiltPromptMetadata, ConversationTurn, PromptTemplate};
