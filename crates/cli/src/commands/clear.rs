//! Clear command handler.

use clap::Args;
use recall_core::{config::AppConfig, AppError, AppResult};

use super::open_engine;

/// Remove all learned documents and cached answers
#[derive(Args, Debug)]
pub struct ClearCommand {
    /// Confirm removal
    #[arg(short, long)]
    pub yes: bool,
}

impl ClearCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing clear command");

        if !self.yes {
            return Err(AppError::Config(
                "Refusing to clear the knowledge base without --yes".to_string(),
            ));
        }

        let engine = open_engine(config).await?;
        let result = engine.clear().await;
        engine.destroy().await?;
        result?;

        println!("Knowledge base cleared");
        Ok(())
    }
}
