//! Recall CLI
//!
//! Main entry point for the recall command-line tool: learn local
//! documents and ask questions about them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ClearCommand, LearnCommand, StatusCommand};
use recall_core::{
    config::{AppConfig, Overrides},
    logging::{self, LogFormat},
    AppResult,
};
use std::path::PathBuf;

/// Recall - answer questions from your own documents, locally
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(about = "Answer questions from your own documents, locally", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RECALL_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Preferred generation provider (on-device, local-model, none)
    #[arg(short, long, global = true, env = "RECALL_PROVIDER")]
    provider: Option<String>,

    /// Local model identifier
    #[arg(short, long, global = true, env = "RECALL_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Learn from files, directories, URLs or inline text
    Learn(LearnCommand),

    /// Ask a question about learned documents
    Ask(AskCommand),

    /// Show engine and knowledge base status
    Status(StatusCommand),

    /// Remove all learned documents and cached answers
    Clear(ClearCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()?.with_overrides(Overrides {
        workspace: cli.workspace,
        config_file: cli.config,
        provider: cli.provider,
        model: cli.model,
        log_level: cli.log_level,
        verbose: cli.verbose,
        no_color: cli.no_color,
        json_logs: cli.json_logs,
    });

    let format = if config.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("Recall CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {:?}", config.provider);
    tracing::debug!("Model: {:?}", config.model);

    config.validate()?;
    config.ensure_recall_dir()?;

    let command_name = match &cli.command {
        Commands::Learn(_) => "learn",
        Commands::Ask(_) => "ask",
        Commands::Status(_) => "status",
        Commands::Clear(_) => "clear",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Learn(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
        Commands::Clear(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
