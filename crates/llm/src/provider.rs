//! Generation providers and their shared four-operation contract.
//!
//! The provider set is closed: every provider the orchestrator can select is
//! a variant of [`GenerationProvider`]. Each variant answers the same
//! questions (is it available, prepare it, generate, release it) so the
//! orchestrator never needs to know which one it holds.

use crate::providers::{LocalModelProvider, OnDeviceProvider};
use crate::types::ProviderId;
use recall_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Replaces the provider's default system prompt
    pub system_prompt: Option<String>,

    /// Maximum output tokens
    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    /// Free-text context placed ahead of the prompt by the provider
    pub context: Option<String>,

    /// Overrides the provider's default timeout
    pub timeout: Option<Duration>,
}

impl GenerateOptions {
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Lifecycle state of one provider, owned by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Uninitialized,
    Probing,
    Ready,
    Unavailable,
    Failed,
}

/// Default system prompt for answer generation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Provide clear, concise answers based on the context provided. If the context does not contain the answer, say so.";

/// A generation provider.
pub enum GenerationProvider {
    OnDevice(OnDeviceProvider),
    LocalModel(LocalModelProvider),
    /// Registered so status reports can name it; never selected.
    None,
}

impl GenerationProvider {
    pub fn id(&self) -> ProviderId {
        match self {
            Self::OnDevice(_) => ProviderId::OnDevice,
            Self::LocalModel(_) => ProviderId::LocalModel,
            Self::None => ProviderId::None,
        }
    }

    /// Check whether the provider can be used on this host.
    pub async fn is_available(&self) -> bool {
        match self {
            Self::OnDevice(p) => p.is_available().await,
            Self::LocalModel(p) => p.is_available().await,
            Self::None => false,
        }
    }

    /// Prepare the provider for generation. Idempotent.
    pub async fn initialize(&self) -> AppResult<()> {
        match self {
            Self::OnDevice(p) => p.initialize().await,
            Self::LocalModel(p) => p.initialize().await,
            Self::None => Err(AppError::GenerationUnavailable(
                "the none provider does not generate".to_string(),
            )),
        }
    }

    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> AppResult<String> {
        match self {
            Self::OnDevice(p) => p.generate(prompt, options).await,
            Self::LocalModel(p) => p.generate(prompt, options).await,
            Self::None => Err(AppError::GenerationUnavailable(
                "the none provider does not generate".to_string(),
            )),
        }
    }

    /// Release sessions or loaded models.
    pub async fn cleanup(&self) {
        match self {
            Self::OnDevice(p) => p.cleanup().await,
            Self::LocalModel(p) => p.cleanup().await,
            Self::None => {}
        }
    }
}

impl std::fmt::Debug for GenerationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("GenerationProvider").field(&self.id()).finish()
    }
}

/// Compose the text sent to a completion runtime.
pub(crate) fn compose_input(prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(context) if !context.trim().is_empty() => {
            format!("Context:\n{}\n\nQuestion: {}", context, prompt)
        }
        _ => prompt.to_string(),
    }
}
