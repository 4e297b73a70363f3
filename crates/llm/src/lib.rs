//! Generation for Recall.
//!
//! This crate owns everything that turns a prompt into text:
//! - [`LlmClient`]: transport to a completion runtime (Ollama)
//! - [`GenerationProvider`]: the closed set of providers (on-device,
//!   local model, none) sharing one availability/initialize/generate/cleanup
//!   contract
//! - [`GenerationOrchestrator`]: fallback-ordered selection, a shared
//!   initialization attempt and per-call deadlines
//!
//! # Example
//! ```no_run
//! use recall_llm::{create_orchestrator, GenerateOptions, GenerationConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = create_orchestrator(&GenerationConfig::default(), None)?;
//! let output = orchestrator
//!     .generate("What is Rust?", GenerateOptions::default())
//!     .await?;
//! println!("{} (via {})", output.text, output.provider);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::{create_client, create_orchestrator, create_orchestrator_with_client};
pub use orchestrator::{
    normalize_fallback_order, GenerationOrchestrator, GenerationOutput, OrchestratorStatus,
    ProviderStatus,
};
pub use provider::{GenerateOptions, GenerationProvider, ProviderState, DEFAULT_SYSTEM_PROMPT};
pub use providers::{
    Availability, LocalModelProvider, OllamaClient, OllamaError, OllamaHttp, OnDeviceProvider,
    OnDeviceRuntime, OnDeviceSession, SessionOptions, DEFAULT_OLLAMA_URL,
};
pub use types::{GenerationConfig, LocalModelOptions, OnDeviceOptions, ProviderId, ProviderTimeouts};
