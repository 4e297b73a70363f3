//! Prompt builder for rendering generation prompts.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, ConversationTurn, PromptTemplate};
use handlebars::Handlebars;
use recall_core::{AppError, AppResult};
use serde::Serialize;

/// Build the generation prompt for a question.
///
/// Only the last `template.history_turns` turns of `history` are rendered.
///
/// # Example
/// ```
/// use recall_prompt::{build_answer_prompt, ConversationTurn, PromptTemplate};
///
/// let history = vec![ConversationTurn::new("What is Rust?", "A systems language.")];
/// let built = build_answer_prompt(
///     &PromptTemplate::default(),
///     "Who maintains it?",
///     "The Rust project is maintained by the Rust teams.",
///     &history,
/// )
/// .unwrap();
/// assert!(built.user.contains("Question: Who maintains it?"));
/// ```
pub fn build_answer_prompt(
    template: &PromptTemplate,
    query: &str,
    context: &str,
    history: &[ConversationTurn],
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", template.id);

    let recent = &history[history.len().saturating_sub(template.history_turns)..];

    let data = serde_json::json!({
        "query": query,
        "context": context,
        "history": recent,
    });

    let user = render_template(&template.template, &data)?;

    Ok(BuiltPrompt {
        system: template.system.clone(),
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: template.id.clone(),
            history_turns_used: recent.len(),
            context_chars: context.chars().count(),
        },
    })
}

/// Render a Handlebars template with serializable data.
pub fn render_template<T: Serialize>(template: &str, data: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text prompts, no HTML escaping
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
