//! Concrete generation providers and transports.

pub mod local_model;
pub mod ollama;
pub mod on_device;

pub use local_model::LocalModelProvider;
pub use ollama::{OllamaClient, OllamaError, OllamaHttp, DEFAULT_OLLAMA_URL};
pub use on_device::{Availability, OnDeviceProvider, OnDeviceRuntime, OnDeviceSession, SessionOptions};
