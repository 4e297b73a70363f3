//! Structured progress reporting for engine operations.
//!
//! The engine publishes [`ProgressEvent`]s on a broadcast channel. Any
//! number of consumers may [`subscribe`](ProgressReporter::subscribe); events
//! sent while nobody listens are dropped.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Events buffered per subscriber before the oldest are overwritten.
const CHANNEL_CAPACITY: usize = 64;

/// Stage of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStage {
    Init,
    EmbeddingLoad,
    GenerationLoad,
    Indexing,
    Retrieval,
    Generation,
    Complete,
    Error,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Init => "init",
            ProgressStage::EmbeddingLoad => "embedding-load",
            ProgressStage::GenerationLoad => "generation-load",
            ProgressStage::Indexing => "indexing",
            ProgressStage::Retrieval => "retrieval",
            ProgressStage::Generation => "generation",
            ProgressStage::Complete => "complete",
            ProgressStage::Error => "error",
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,

    /// Percentage complete (0 - 100)
    pub progress: u8,

    /// Human-readable message
    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: f64,
}

impl ProgressEvent {
    pub fn new(stage: ProgressStage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            message: message.into(),
            elapsed_secs: 0.0,
        }
    }

    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        format!("[{}] {:>3}% - {}", self.stage, self.progress, self.message)
    }
}

/// Publishes progress events to subscribers.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressEvent>,
    start_time: Arc<Instant>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            start_time: Arc::new(Instant::now()),
        }
    }

    /// New receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, stage: ProgressStage, progress: u8, message: impl Into<String>) {
        let mut event = ProgressEvent::new(stage, progress, message);
        event.elapsed_secs = self.start_time.elapsed().as_secs_f64();

        tracing::debug!(
            stage = %event.stage,
            progress = event.progress,
            message = %event.message,
            elapsed_secs = event.elapsed_secs,
            "Progress event"
        );

        // No receivers is not an error
        let _ = self.sender.send(event);
    }
}
