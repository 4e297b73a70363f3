//! Local model generation through a completion runtime such as Ollama.

use crate::client::{LlmClient, LlmRequest};
use crate::provider::{compose_input, GenerateOptions, DEFAULT_SYSTEM_PROMPT};
use crate::types::LocalModelOptions;
use recall_core::{AppError, AppResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Provider backed by an [`LlmClient`].
pub struct LocalModelProvider {
    client: Arc<dyn LlmClient>,
    options: LocalModelOptions,
    max_tokens: u32,
    temperature: f32,
    ready: AtomicBool,
}

impl LocalModelProvider {
    pub fn new(
        client: Arc<dyn LlmClient>,
        options: LocalModelOptions,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            options,
            max_tokens,
            temperature,
            ready: AtomicBool::new(false),
        }
    }

    pub fn model(&self) -> &str {
        &self.options.model
    }

    pub async fn is_available(&self) -> bool {
        self.client.is_reachable().await
    }

    pub async fn initialize(&self) -> AppResult<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        if self.options.require_model && !self.client.has_model(&self.options.model).await? {
            return Err(AppError::GenerationUnavailable(format!(
                "model '{}' is not installed in {}",
                self.options.model,
                self.client.provider_name()
            )));
        }

        self.ready.store(true, Ordering::Release);
        tracing::info!(
            "Local model '{}' ready via {}",
            self.options.model,
            self.client.provider_name()
        );
        Ok(())
    }

    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> AppResult<String> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(AppError::GenerationUnavailable(
                "local model not initialized".to_string(),
            ));
        }

        let system = options
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let input = format!("{}\n\nAnswer:", compose_input(prompt, options.context.as_deref()));

        let request = LlmRequest::new(input.clone(), self.options.model.clone())
            .with_system(system)
            .with_max_tokens(options.max_tokens.unwrap_or(self.max_tokens))
            .with_temperature(options.temperature.unwrap_or(self.temperature));

        let response = self.client.complete(&request).await?;
        Ok(clean_completion(&response.content, &input))
    }

    pub async fn cleanup(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

/// Strip an echoed prompt and surrounding whitespace from a completion.
fn clean_completion(content: &str, input: &str) -> String {
    let text = content.strip_prefix(input).unwrap_or(content);
    let text = text.trim();
    text.strip_prefix("Answer:").unwrap_or(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LlmResponse, LlmUsage};
    use std::sync::Mutex;

    struct RecordingClient {
        reachable: bool,
        models: Vec<String>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for RecordingClient {
        fn provider_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(LlmResponse {
                content: format!("{}  Answer: Rust is fast. ", request.prompt),
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
            })
        }

        async fn is_reachable(&self) -> bool {
            self.reachable
        }

        async fn has_model(&self, model: &str) -> AppResult<bool> {
            Ok(self.models.iter().any(|m| m == model))
        }
    }

    fn client(models: &[&str]) -> Arc<RecordingClient> {
        Arc::new(RecordingClient {
            reachable: true,
            models: models.iter().map(|m| m.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_missing_model_fails_initialization() {
        let provider = LocalModelProvider::new(client(&["qwen2.5"]), LocalModelOptions::default(), 150, 0.7);
        assert!(provider.is_available().await);
        let result = provider.initialize().await;
        assert!(matches!(result, Err(AppError::GenerationUnavailable(_))));
    }

    #[tokio::test]
    async fn test_generate_builds_request_and_strips_echo() {
        let recording = client(&["llama3.2"]);
        let provider = LocalModelProvider::new(recording.clone(), LocalModelOptions::default(), 150, 0.7);
        provider.initialize().await.unwrap();

        let options = GenerateOptions::default()
            .with_context("Rust is a systems language.")
            .with_max_tokens(64);
        let text = provider.generate("Why Rust?", &options).await.unwrap();
        assert_eq!(text, "Rust is fast.");

        let requests = recording.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "llama3.2");
        assert_eq!(requests[0].max_tokens, Some(64));
        assert_eq!(requests[0].temperature, Some(0.7));
        assert!(requests[0].prompt.starts_with("Context:\nRust is a systems language."));
        assert!(requests[0].prompt.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn test_cleanup_requires_reinitialization() {
        let provider = LocalModelProvider::new(client(&["llama3.2"]), LocalModelOptions::default(), 150, 0.7);
        provider.initialize().await.unwrap();
        provider.cleanup().await;
        let result = provider.generate("hi", &GenerateOptions::default()).await;
        assert!(matches!(result, Err(AppError::GenerationUnavailable(_))));
    }
}
