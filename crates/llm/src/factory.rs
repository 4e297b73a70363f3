//! Provider factory.
//!
//! Builds completion clients and the generation orchestrator from
//! configuration. The on-device runtime is supplied by the host because it
//! lives outside this process's control.

use crate::client::LlmClient;
use crate::orchestrator::GenerationOrchestrator;
use crate::provider::GenerationProvider;
use crate::providers::{
    LocalModelProvider, OllamaClient, OnDeviceProvider, OnDeviceRuntime, DEFAULT_OLLAMA_URL,
};
use crate::types::GenerationConfig;
use recall_core::{AppError, AppResult};
use std::sync::Arc;

/// Create a completion client for a runtime name.
///
/// # Arguments
/// * `runtime` - Runtime identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
pub fn create_client(runtime: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    match runtime.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        _ => Err(AppError::Config(format!(
            "Unknown completion runtime: {}. Supported: ollama",
            runtime
        ))),
    }
}

/// Build an orchestrator whose local-model provider talks to Ollama.
pub fn create_orchestrator(
    config: &GenerationConfig,
    on_device: Option<Arc<dyn OnDeviceRuntime>>,
) -> AppResult<GenerationOrchestrator> {
    let client = create_client("ollama", Some(&config.local_model.endpoint))?;
    Ok(create_orchestrator_with_client(config, on_device, client))
}

/// Build an orchestrator around an explicit completion client.
pub fn create_orchestrator_with_client(
    config: &GenerationConfig,
    on_device: Option<Arc<dyn OnDeviceRuntime>>,
    client: Arc<dyn LlmClient>,
) -> GenerationOrchestrator {
    let providers = vec![
        GenerationProvider::OnDevice(OnDeviceProvider::new(on_device, config.on_device.clone())),
        GenerationProvider::LocalModel(LocalModelProvider::new(
            client,
            config.local_model.clone(),
            config.max_tokens,
            config.temperature,
        )),
        GenerationProvider::None,
    ];

    GenerationOrchestrator::new(providers, &config.fallback_order, config.timeouts.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderState;
    use crate::types::ProviderId;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        assert!(create_client("Ollama", Some("http://localhost:8080")).is_ok());
    }

    #[test]
    fn test_unknown_runtime() {
        match create_client("unknown", None) {
            Err(err) => assert!(err.to_string().contains("Unknown completion runtime")),
            Ok(_) => panic!("Expected error for unknown runtime"),
        }
    }

    #[test]
    fn test_orchestrator_registers_all_providers() {
        let orchestrator = create_orchestrator(&GenerationConfig::default(), None).unwrap();
        let status = orchestrator.status();

        assert!(!status.available);
        assert_eq!(
            status.fallback_order,
            vec![ProviderId::OnDevice, ProviderId::LocalModel]
        );
        let ids: Vec<_> = status.providers.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProviderId::OnDevice, ProviderId::LocalModel, ProviderId::None]);
        assert!(status
            .providers
            .iter()
            .all(|p| p.state == ProviderState::Uninitialized));
    }
}
