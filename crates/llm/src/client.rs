//! Completion transport.
//!
//! A `LlmClient` only knows how to turn one prompt into one completion.
//! Availability, timeouts and lifecycle belong to the generation providers
//! that wrap it.

use recall_core::AppResult;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Fully rendered user prompt
    pub prompt: String,

    /// Runtime model name (e.g. "llama3.2:1b")
    pub model: String,

    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            system: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Completed text and runtime bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,

    /// Model name as reported by the runtime
    pub model: String,

    pub usage: LlmUsage,

    /// False when the runtime stopped before finishing (token cap, abort)
    pub done: bool,
}

/// Token counts reported by the runtime. Zero when it does not report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Transport to a text-completion runtime.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Runtime name used in logs (e.g. "ollama").
    fn provider_name(&self) -> &str;

    /// Run one non-streaming completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    /// Liveness check used before a provider is selected.
    async fn is_reachable(&self) -> bool {
        true
    }

    /// Whether `model` is installed in the runtime.
    async fn has_model(&self, _model: &str) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("Summarize", "llama3.2:1b")
            .with_system("Be brief")
            .with_max_tokens(150)
            .with_temperature(0.2);

        assert_eq!(request.system.as_deref(), Some("Be brief"));
        assert_eq!(request.max_tokens, Some(150));
        assert_eq!(request.temperature, Some(0.2));
    }

    #[test]
    fn test_usage_total_saturates() {
        assert_eq!(LlmUsage::new(12, 30).total(), 42);
        assert_eq!(LlmUsage::new(u32::MAX, 1).total(), u32::MAX);
    }
}
