//! Command handlers for the Recall CLI.

pub mod ask;
pub mod clear;
pub mod learn;
pub mod status;

pub use ask::AskCommand;
pub use clear::ClearCommand;
pub use learn::LearnCommand;
pub use status::StatusCommand;

use recall_core::{config::AppConfig, AppError, AppResult};
use recall_knowledge::{load_config, EngineConfig, KnowledgeEngine};
use recall_llm::ProviderId;

/// Open and initialize the engine for the configured workspace.
pub async fn open_engine(config: &AppConfig) -> AppResult<KnowledgeEngine> {
    let engine_config = engine_config(config)?;
    let engine = KnowledgeEngine::open_with_config(&config.workspace, engine_config)?;
    engine.initialize().await?;
    Ok(engine)
}

/// Engine config from `.recall/engine.yaml` with the CLI provider and model applied.
pub fn engine_config(config: &AppConfig) -> AppResult<EngineConfig> {
    let mut engine_config = load_config(&config.workspace)?;

    if let Some(ref provider) = config.provider {
        let id = ProviderId::parse(provider)
            .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;
        if id == ProviderId::None {
            engine_config.generation_enabled = false;
        } else {
            let order = &mut engine_config.generation.fallback_order;
            order.retain(|p| *p != id);
            order.insert(0, id);
        }
    }

    if let Some(ref model) = config.model {
        engine_config.generation.local_model.model = model.clone();
    }

    Ok(engine_config)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{}", output);
    Ok(())
}
