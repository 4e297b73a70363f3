//! Ollama transport.
//!
//! [`OllamaHttp`] is the JSON plumbing shared by completion and embedding;
//! [`OllamaClient`] is the completion client built on it.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use recall_core::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// How long a reachability check may take.
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Failure talking to an Ollama server.
#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("cannot reach Ollama at {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("Ollama returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("unexpected Ollama response: {0}")]
    Decode(reqwest::Error),
}

/// Ollama reports failures as `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// JSON-over-HTTP access to one Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaHttp {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaHttp {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` and decode the JSON reply.
    pub async fn post<B, R>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<R, OllamaError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Self::decode(url, request.send().await).await
    }

    /// GET `path` and decode the JSON reply.
    pub async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<R, OllamaError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Self::decode(url, request.send().await).await
    }

    async fn decode<R: DeserializeOwned>(
        url: String,
        sent: reqwest::Result<reqwest::Response>,
    ) -> Result<R, OllamaError> {
        let response = sent.map_err(|source| OllamaError::Transport { url, source })?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(OllamaError::Status { status, message });
        }

        response.json().await.map_err(OllamaError::Decode)
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: SamplingOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    model: String,
    response: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

/// `/api/tags` reply.
#[derive(Debug, Deserialize)]
struct InstalledModels {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Debug, Deserialize)]
struct InstalledModel {
    name: String,
}

/// Completion client for Ollama's `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: OllamaHttp,
}

impl OllamaClient {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: OllamaHttp::new(base_url),
        }
    }

    fn generate_body(request: &LlmRequest) -> GenerateBody<'_> {
        GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            options: SamplingOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            stream: false,
        }
    }

    async fn installed_models(&self) -> Result<Vec<String>, OllamaError> {
        let installed: InstalledModels = self.http.get("/api/tags", Some(REACHABILITY_TIMEOUT)).await?;
        Ok(installed.models.into_iter().map(|m| m.name).collect())
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }
}

/// Ollama reports tagged names ("llama3.2:latest"); bare names match any tag.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .split_once(':')
            .is_some_and(|(name, _)| !wanted.contains(':') && name == wanted)
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Ollama completion request");

        let reply: GenerateReply = self
            .http
            .post("/api/generate", &Self::generate_body(request), None)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;

        let usage = LlmUsage::new(reply.prompt_eval_count, reply.eval_count);
        tracing::debug!(tokens = usage.total(), done = reply.done, "Ollama completion finished");

        Ok(LlmResponse {
            content: reply.response,
            model: reply.model,
            usage,
            done: reply.done,
        })
    }

    async fn is_reachable(&self) -> bool {
        match self.installed_models().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Ollama not reachable: {}", e);
                false
            }
        }
    }

    async fn has_model(&self, model: &str) -> AppResult<bool> {
        let installed = self
            .installed_models()
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;
        Ok(installed.iter().any(|name| model_matches(name, model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        assert_eq!(OllamaClient::default().http.base_url(), "http://localhost:11434");
        assert_eq!(OllamaHttp::new("http://127.0.0.1:11434/").base_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_generate_body_serialization() {
        let request = LlmRequest::new("Hello", "llama3")
            .with_temperature(0.5)
            .with_max_tokens(100);

        let body = serde_json::to_value(OllamaClient::generate_body(&request)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "llama3",
                "prompt": "Hello",
                "options": { "temperature": 0.5, "num_predict": 100 },
                "stream": false
            })
        );
    }

    #[test]
    fn test_model_matching() {
        assert!(model_matches("llama3.2:latest", "llama3.2"));
        assert!(model_matches("llama3.2:latest", "llama3.2:latest"));
        assert!(!model_matches("llama3.2:1b", "llama3.2:latest"));
        assert!(!model_matches("qwen2.5:latest", "llama3.2"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_reported() {
        // Port 9 (discard) is not an Ollama server.
        let client = OllamaClient::with_base_url("http://127.0.0.1:9");
        assert!(!client.is_reachable().await);
        assert!(matches!(client.has_model("llama3.2").await, Err(AppError::Llm(_))));
    }
}
