//! Learn command handler.
//!
//! Ingests files, directories, URLs and inline text into the knowledge base.

use clap::Args;
use recall_core::{config::AppConfig, AppError, AppResult};
use recall_knowledge::{IngestReport, IngestStatus, KnowledgeSource};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::{open_engine, print_json};

/// File extensions picked up when walking a directory.
const SUPPORTED_EXTENSIONS: [&str; 7] = ["md", "markdown", "txt", "rst", "json", "html", "htm"];

/// Learn from files, directories, URLs or inline text
#[derive(Args, Debug)]
pub struct LearnCommand {
    /// Files or directories to learn from
    pub paths: Vec<PathBuf>,

    /// Web pages to fetch and learn
    #[arg(long)]
    pub url: Vec<String>,

    /// Inline text to learn
    #[arg(long)]
    pub text: Vec<String>,

    /// Inline JSON record (content/title/description/entries)
    #[arg(long)]
    pub record: Vec<String>,

    /// Document id (only valid with a single source)
    #[arg(long)]
    pub id: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl LearnCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing learn command");

        let sources = self.collect_sources()?;
        if sources.is_empty() {
            return Err(AppError::InvalidSource(
                "Nothing to learn: pass paths, --url, --text or --record".to_string(),
            ));
        }

        let engine = open_engine(config).await?;
        let mut reports = Vec::with_capacity(sources.len());
        let mut failures = 0usize;

        for source in sources {
            let origin = source.origin();
            match engine.load_knowledge(source).await {
                Ok(report) => {
                    if !self.json {
                        println!("{}", describe(&report));
                    }
                    reports.push(report);
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!("Failed to learn {}: {}", origin, e);
                    if !self.json {
                        eprintln!("Skipped {}: {}", origin, e);
                    }
                }
            }
        }

        engine.destroy().await?;

        if self.json {
            print_json(&serde_json::json!({
                "documents": reports,
                "failed": failures,
            }))?;
        } else {
            let indexed = reports
                .iter()
                .filter(|r| r.status == IngestStatus::Indexed)
                .count();
            let units: usize = reports.iter().map(|r| r.unit_count).sum();
            println!(
                "Learned {} documents ({} indexed, {} unchanged, {} failed), {} chunks",
                reports.len(),
                indexed,
                reports.len() - indexed,
                failures,
                units
            );
        }

        if reports.is_empty() {
            return Err(AppError::InvalidSource("No source could be learned".to_string()));
        }

        Ok(())
    }

    fn collect_sources(&self) -> AppResult<Vec<KnowledgeSource>> {
        let mut sources = Vec::new();

        for path in &self.paths {
            for file in expand_path(path)? {
                match KnowledgeSource::from_path(&file) {
                    Ok(source) => sources.push(source),
                    Err(e) => tracing::warn!("Skipping {:?}: {}", file, e),
                }
            }
        }

        sources.extend(self.url.iter().map(|url| KnowledgeSource::Url {
            url: url.clone(),
            document_id: None,
        }));

        sources.extend(self.text.iter().map(KnowledgeSource::text));

        for record in &self.record {
            let data = serde_json::from_str(record)
                .map_err(|e| AppError::InvalidSource(format!("Invalid --record JSON: {}", e)))?;
            sources.push(KnowledgeSource::Json {
                data,
                document_id: None,
            });
        }

        if let Some(ref id) = self.id {
            if sources.len() != 1 {
                return Err(AppError::InvalidSource(format!(
                    "--id needs exactly one source, got {}",
                    sources.len()
                )));
            }
            sources = sources
                .into_iter()
                .map(|s| s.with_document_id(id.clone()))
                .collect();
        }

        Ok(sources)
    }
}

/// Files to ingest for a path argument. Directories are walked recursively,
/// skipping hidden entries and unsupported extensions.
fn expand_path(path: &Path) -> AppResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        return Err(AppError::InvalidSource(format!(
            "Path does not exist: {:?}",
            path
        )));
    }

    let files = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Error walking {:?}: {}", path, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
        .map(DirEntry::into_path)
        .collect::<Vec<_>>();

    tracing::debug!("Found {} files under {:?}", files.len(), path);
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn describe(report: &IngestReport) -> String {
    match report.status {
        IngestStatus::Indexed => format!(
            "Indexed {} (v{}, {} chunks, {:.2}s)",
            report.document_id, report.version, report.unit_count, report.duration_secs
        ),
        IngestStatus::Unchanged => format!(
            "Unchanged {} (v{}, {} chunks)",
            report.document_id, report.version, report.unit_count
        ),
    }
}
