//! Generation configuration types.

use recall_core::config::canonical_provider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a generation provider in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    /// Host-supplied on-device model session
    OnDevice,
    /// Local model runtime reached over HTTP (Ollama)
    LocalModel,
    /// Sentinel that never generates
    None,
}

impl ProviderId {
    /// Parse a provider id from its canonical name or a common alias.
    pub fn parse(s: &str) -> Option<Self> {
        match canonical_provider(s)? {
            "on-device" => Some(Self::OnDevice),
            "local-model" => Some(Self::LocalModel),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDevice => "on-device",
            Self::LocalModel => "local-model",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-provider default timeouts applied to a single `generate` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderTimeouts {
    #[serde(default = "default_on_device_timeout")]
    pub on_device_ms: u64,

    #[serde(default = "default_local_model_timeout")]
    pub local_model_ms: u64,

    /// Used for any provider without its own entry
    #[serde(default = "default_fallback_timeout")]
    pub fallback_ms: u64,
}

fn default_on_device_timeout() -> u64 {
    5000
}

fn default_local_model_timeout() -> u64 {
    10_000
}

fn default_fallback_timeout() -> u64 {
    2000
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            on_device_ms: default_on_device_timeout(),
            local_model_ms: default_local_model_timeout(),
            fallback_ms: default_fallback_timeout(),
        }
    }
}

impl ProviderTimeouts {
    /// Default timeout for a provider.
    pub fn for_provider(&self, id: ProviderId) -> Duration {
        let ms = match id {
            ProviderId::OnDevice => self.on_device_ms,
            ProviderId::LocalModel => self.local_model_ms,
            ProviderId::None => self.fallback_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Settings for the local-model provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalModelOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Verify the model is installed during initialization
    #[serde(default = "default_true")]
    pub require_model: bool,
}

fn default_endpoint() -> String {
    crate::providers::DEFAULT_OLLAMA_URL.to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LocalModelOptions {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            require_model: default_true(),
        }
    }
}

/// Settings for on-device sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnDeviceOptions {
    #[serde(default = "default_session_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Accept a runtime whose model still has to be downloaded
    #[serde(default = "default_true")]
    pub allow_download: bool,
}

fn default_session_temperature() -> f32 {
    0.7
}

fn default_top_k() -> u32 {
    3
}

impl Default for OnDeviceOptions {
    fn default() -> Self {
        Self {
            temperature: default_session_temperature(),
            top_k: default_top_k(),
            allow_download: default_true(),
        }
    }
}

/// Complete generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// Providers tried in order during initialization
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<ProviderId>,

    #[serde(default)]
    pub timeouts: ProviderTimeouts,

    #[serde(default)]
    pub local_model: LocalModelOptions,

    #[serde(default)]
    pub on_device: OnDeviceOptions,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_fallback_order() -> Vec<ProviderId> {
    vec![ProviderId::OnDevice, ProviderId::LocalModel]
}

fn default_max_tokens() -> u32 {
    150
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            fallback_order: default_fallback_order(),
            timeouts: ProviderTimeouts::default(),
            local_model: LocalModelOptions::default(),
            on_device: OnDeviceOptions::default(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_parsing() {
        assert_eq!(ProviderId::parse("on-device"), Some(ProviderId::OnDevice));
        assert_eq!(ProviderId::parse("chrome-ai"), Some(ProviderId::OnDevice));
        assert_eq!(ProviderId::parse("local-model"), Some(ProviderId::LocalModel));
        assert_eq!(ProviderId::parse("Ollama"), Some(ProviderId::LocalModel));
        assert_eq!(ProviderId::parse("none"), Some(ProviderId::None));
        assert_eq!(ProviderId::parse("openai"), None);
    }

    #[test]
    fn test_provider_id_round_trips_through_name() {
        for id in [ProviderId::OnDevice, ProviderId::LocalModel, ProviderId::None] {
            assert_eq!(ProviderId::parse(id.as_str()), Some(id));
        }
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = ProviderTimeouts::default();
        assert_eq!(timeouts.for_provider(ProviderId::OnDevice), Duration::from_millis(5000));
        assert_eq!(timeouts.for_provider(ProviderId::LocalModel), Duration::from_millis(10_000));
        assert_eq!(timeouts.for_provider(ProviderId::None), Duration::from_millis(2000));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: GenerationConfig =
            serde_yaml::from_str("fallback_order: [local-model]\nlocal_model:\n  model: qwen2.5\n")
                .unwrap();
        assert_eq!(config.fallback_order, vec![ProviderId::LocalModel]);
        assert_eq!(config.local_model.model, "qwen2.5");
        assert_eq!(config.local_model.endpoint, "http://localhost:11434");
        assert_eq!(config.max_tokens, 150);
    }
}
