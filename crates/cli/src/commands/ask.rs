//! Ask command handler.
//!
//! Answers a question from the knowledge base.

use clap::Args;
use recall_core::{config::AppConfig, AppError, AppResult};
use recall_knowledge::{Answer, AnswerRoute, AskOptions};
use std::path::PathBuf;
use std::time::Duration;

use super::{open_engine, print_json};

/// Ask a question about learned documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "query")]
    pub file: Option<PathBuf>,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Answer extractively, never call a generation provider
    #[arg(long)]
    pub no_generation: bool,

    /// Generation timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Show the answer route and timing
    #[arg(long)]
    pub explain: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let query = self.get_query()?;
        let options = AskOptions {
            top_k: self.top_k,
            allow_generation: self.no_generation.then_some(false),
            timeout: self.timeout_ms.map(Duration::from_millis),
            history: Vec::new(),
        };

        let engine = open_engine(config).await?;
        let result = engine.ask(&query, options).await;
        engine.destroy().await?;
        let answer = result?;

        tracing::debug!(
            confidence = answer.confidence,
            sources = answer.sources.len(),
            total_ms = answer.timing.total_ms,
            "Answer ready"
        );

        if self.json {
            print_json(&answer)
        } else {
            print_answer(&answer, self.explain);
            Ok(())
        }
    }

    fn get_query(&self) -> AppResult<String> {
        if let Some(ref path) = self.file {
            return std::fs::read_to_string(path)
                .map_err(|e| AppError::InvalidQuery(format!("Failed to read {:?}: {}", path, e)));
        }

        self.query
            .clone()
            .ok_or_else(|| AppError::InvalidQuery("No question provided".to_string()))
    }
}

fn print_answer(answer: &Answer, explain: bool) {
    println!("{}", answer.text);

    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            let label = source.title.as_deref().unwrap_or(&source.id);
            match source.url {
                Some(ref url) => println!("- {} ({:.2}) {}", label, source.similarity, url),
                None => println!("- {} ({:.2})", label, source.similarity),
            }
        }
    }

    if explain {
        println!();
        println!("Route: {}", describe_route(&answer.route));
        println!("Query type: {}", answer.query_type);
        println!("Confidence: {:.2}", answer.confidence);
        if let Some(provider) = answer.provider {
            println!("Provider: {}", provider.as_str());
        }
        println!(
            "Timing: retrieval {}ms, generation {}ms, total {}ms",
            answer.timing.retrieval_ms, answer.timing.generation_ms, answer.timing.total_ms
        );
    }
}

fn describe_route(route: &AnswerRoute) -> String {
    match route {
        AnswerRoute::Conversational => "conversational".to_string(),
        AnswerRoute::OutOfScope => "out of scope".to_string(),
        AnswerRoute::Extractive { skip } => format!("extractive ({})", skip),
        AnswerRoute::Generated => "generated".to_string(),
        AnswerRoute::GenerationFailed { reason } => {
            format!("extractive after failed generation ({})", reason)
        }
    }
}
