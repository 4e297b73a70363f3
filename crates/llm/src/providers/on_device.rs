//! On-device generation through a host-supplied model runtime.
//!
//! The host (a desktop shell, a browser bridge, an embedded SDK) implements
//! [`OnDeviceRuntime`]; this provider only manages the session lifecycle.

use crate::provider::{compose_input, GenerateOptions, DEFAULT_SYSTEM_PROMPT};
use crate::types::OnDeviceOptions;
use recall_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Whether the runtime's model can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    Readily,
    /// Usable once the host finishes downloading the model
    AfterDownload,
    No,
}

/// Options for a new session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub temperature: f32,
    pub top_k: u32,
}

/// Host capability that creates model sessions.
#[async_trait::async_trait]
pub trait OnDeviceRuntime: Send + Sync {
    async fn availability(&self) -> AppResult<Availability>;

    async fn create_session(&self, options: &SessionOptions) -> AppResult<Box<dyn OnDeviceSession>>;
}

/// A live model session.
#[async_trait::async_trait]
pub trait OnDeviceSession: Send + Sync {
    async fn prompt(&self, input: &str) -> AppResult<String>;

    async fn destroy(&self);
}

/// Provider backed by an [`OnDeviceRuntime`].
pub struct OnDeviceProvider {
    /// `None` when the host exposes no runtime.
    runtime: Option<Arc<dyn OnDeviceRuntime>>,
    options: OnDeviceOptions,
    session: Mutex<Option<Arc<dyn OnDeviceSession>>>,
}

impl OnDeviceProvider {
    pub fn new(runtime: Option<Arc<dyn OnDeviceRuntime>>, options: OnDeviceOptions) -> Self {
        Self {
            runtime,
            options,
            session: Mutex::new(None),
        }
    }

    pub async fn is_available(&self) -> bool {
        let Some(runtime) = &self.runtime else {
            return false;
        };

        match runtime.availability().await {
            Ok(Availability::Readily) => true,
            Ok(Availability::AfterDownload) => self.options.allow_download,
            Ok(Availability::No) => false,
            Err(e) => {
                tracing::debug!("On-device availability check failed: {}", e);
                false
            }
        }
    }

    pub async fn initialize(&self) -> AppResult<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let runtime = self.runtime.as_ref().ok_or_else(|| {
            AppError::GenerationUnavailable("no on-device runtime on this host".to_string())
        })?;

        match runtime.availability().await? {
            Availability::No => {
                return Err(AppError::GenerationUnavailable(
                    "on-device model not supported on this device".to_string(),
                ))
            }
            Availability::AfterDownload => {
                tracing::warn!("On-device model must be downloaded before first use");
            }
            Availability::Readily => {}
        }

        let created = runtime
            .create_session(&SessionOptions {
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                temperature: self.options.temperature,
                top_k: self.options.top_k,
            })
            .await
            .map_err(|e| AppError::Llm(format!("On-device initialization failed: {}", e)))?;

        *session = Some(Arc::from(created));
        tracing::info!("On-device session created");
        Ok(())
    }

    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> AppResult<String> {
        let session = self.session.lock().await.clone().ok_or_else(|| {
            AppError::GenerationUnavailable("on-device session not initialized".to_string())
        })?;

        let mut input = compose_input(prompt, options.context.as_deref());
        if let Some(system) = options.system_prompt.as_deref() {
            // Sessions fix their system prompt at creation; carry overrides inline.
            input = format!("{}\n\n{}", system, input);
        }

        let response = session
            .prompt(&input)
            .await
            .map_err(|e| AppError::Llm(format!("On-device generation failed: {}", e)))?;

        Ok(response.trim().to_string())
    }

    pub async fn cleanup(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.destroy().await;
            tracing::debug!("On-device session destroyed");
        }
    }
}
