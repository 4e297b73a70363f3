//! Status command handler.

use clap::Args;
use recall_core::{config::AppConfig, AppResult};

use super::{open_engine, print_json};

/// Show engine and knowledge base status
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing status command");

        let engine = open_engine(config).await?;
        let result = engine.status().await;
        engine.destroy().await?;
        let status = result?;

        if self.json {
            return print_json(&status);
        }

        println!("Workspace: {}", config.workspace.display());
        println!("Store: {}", status.store_backend);
        println!("Documents: {}", status.document_count);
        println!("Chunks: {}", status.chunk_count);
        println!("Cached answers: {}", status.cache_entries);
        println!(
            "Embeddings: {} ({})",
            status.embedding_model,
            if status.embeddings_ready { "ready" } else { "degraded" }
        );
        match status.active_provider {
            Some(provider) => println!("Generation: {}", provider.as_str()),
            None if status.generation_loading => println!("Generation: loading"),
            None => println!("Generation: unavailable (extractive answers only)"),
        }

        Ok(())
    }
}
