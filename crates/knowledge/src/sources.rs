//! Source adapters: turn structured records, plain text, lists, files and
//! web pages into the plain text the chunker consumes.

use std::path::Path;
use std::time::Duration;

use recall_core::{AppError, AppResult};
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;

use crate::types::Metadata;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Length of the checksum prefix used in derived document ids.
const DERIVED_ID_HEX_CHARS: usize = 12;

/// Elements whose text never reaches the index.
const SKIPPED_ELEMENTS: [&str; 6] = ["head", "script", "style", "noscript", "template", "svg"];

/// Elements followed by a paragraph break.
const BLOCK_ELEMENTS: [&str; 23] = [
    "p", "div", "section", "article", "main", "header", "footer", "aside", "nav", "li", "ul",
    "ol", "table", "tr", "pre", "blockquote", "br", "h1", "h2", "h3", "h4", "h5",
    "h6",
];

/// Input accepted by `load_knowledge`.
#[derive(Debug, Clone)]
pub enum KnowledgeSource {
    /// A record or array of records with `content`/`title`/`description`
    /// fields and optional nested `entries`
    Json {
        data: Value,
        document_id: Option<String>,
    },
    Text {
        content: String,
        metadata: Metadata,
        document_id: Option<String>,
    },
    /// A web page fetched over HTTP
    Url {
        url: String,
        document_id: Option<String>,
    },
    /// Items joined by blank lines
    Array {
        items: Vec<String>,
        document_id: Option<String>,
    },
}

/// Plain text and metadata produced by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub text: String,
    pub metadata: Metadata,
}

impl KnowledgeSource {
    pub fn text(content: impl Into<String>) -> Self {
        KnowledgeSource::Text {
            content: content.into(),
            metadata: Metadata::new(),
            document_id: None,
        }
    }

    /// Read a file from disk. `.json` files become a `Json` source, HTML is
    /// stripped to text, anything else is read as text. The document id
    /// defaults to the path.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::InvalidSource(format!("Failed to read {:?}: {}", path, e)))?;
        let document_id = Some(path.to_string_lossy().into_owned());

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => {
                let data = serde_json::from_str(&raw).map_err(|e| {
                    AppError::InvalidSource(format!("Invalid JSON in {:?}: {}", path, e))
                })?;
                Ok(KnowledgeSource::Json { data, document_id })
            }
            Some("html") | Some("htm") => {
                let mut metadata = Metadata::new();
                if let Some(title) = html_title(&raw) {
                    metadata.insert("title".to_string(), Value::String(title));
                }
                Ok(KnowledgeSource::Text {
                    content: html_to_text(&raw),
                    metadata,
                    document_id,
                })
            }
            _ => {
                let mut metadata = Metadata::new();
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    metadata.insert("title".to_string(), Value::String(name.to_string()));
                }
                Ok(KnowledgeSource::Text {
                    content: raw,
                    metadata,
                    document_id,
                })
            }
        }
    }

    /// Caller-supplied document id, if any.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            KnowledgeSource::Json { document_id, .. }
            | KnowledgeSource::Text { document_id, .. }
            | KnowledgeSource::Url { document_id, .. }
            | KnowledgeSource::Array { document_id, .. } => document_id.as_deref(),
        }
    }

    /// Replace the document id.
    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        let id = Some(id.into());
        match &mut self {
            KnowledgeSource::Json { document_id, .. }
            | KnowledgeSource::Text { document_id, .. }
            | KnowledgeSource::Url { document_id, .. }
            | KnowledgeSource::Array { document_id, .. } => *document_id = id,
        }
        self
    }

    /// Short label used in chunk origins and logs.
    pub fn origin(&self) -> String {
        match self {
            KnowledgeSource::Url { url, .. } => url.clone(),
            KnowledgeSource::Json { .. } => self.document_id().unwrap_or("json").to_string(),
            KnowledgeSource::Text { .. } => self.document_id().unwrap_or("text").to_string(),
            KnowledgeSource::Array { .. } => self.document_id().unwrap_or("array").to_string(),
        }
    }

    /// Convert the source into raw text and metadata.
    pub async fn resolve(&self) -> AppResult<ResolvedSource> {
        let resolved = match self {
            KnowledgeSource::Json { data, .. } => {
                let mut metadata = Metadata::new();
                if let Some(title) = data.get("title").and_then(Value::as_str) {
                    metadata.insert("title".to_string(), Value::String(title.to_string()));
                }
                if let Some(url) = data.get("url").and_then(Value::as_str) {
                    metadata.insert("url".to_string(), Value::String(url.to_string()));
                }
                ResolvedSource {
                    text: json_to_text(data),
                    metadata,
                }
            }
            KnowledgeSource::Text {
                content, metadata, ..
            } => ResolvedSource {
                text: content.clone(),
                metadata: metadata.clone(),
            },
            KnowledgeSource::Url { url, .. } => {
                let html = fetch_url(url).await?;
                let mut metadata = Metadata::new();
                metadata.insert("url".to_string(), Value::String(url.clone()));
                if let Some(title) = html_title(&html) {
                    metadata.insert("title".to_string(), Value::String(title));
                }
                ResolvedSource {
                    text: html_to_text(&html),
                    metadata,
                }
            }
            KnowledgeSource::Array { items, .. } => ResolvedSource {
                text: items
                    .iter()
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
                metadata: Metadata::new(),
            },
        };

        if resolved.text.trim().is_empty() {
            return Err(AppError::InvalidSource(format!(
                "Source {} contains no text",
                self.origin()
            )));
        }

        Ok(resolved)
    }
}

/// Document id for content ingested without one.
pub fn derived_document_id(checksum: &str) -> String {
    let prefix: String = checksum.chars().take(DERIVED_ID_HEX_CHARS).collect();
    format!("doc-{}", prefix)
}

/// Flatten a JSON record (or array of records) to text.
pub fn json_to_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(record_to_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => record_to_text(other),
    }
}

fn record_to_text(value: &Value) -> String {
    let object = match value {
        Value::String(s) => return s.clone(),
        Value::Null => return String::new(),
        Value::Object(object) => object,
        other => return other.to_string(),
    };

    let mut text = String::new();
    for field in ["content", "title", "description"] {
        if let Some(v) = object.get(field) {
            match v {
                Value::String(s) => text.push_str(s),
                other => text.push_str(&other.to_string()),
            }
            text.push('\n');
        }
    }

    if let Some(Value::Array(entries)) = object.get("entries") {
        text.push_str(
            &entries
                .iter()
                .map(record_to_text)
                .collect::<Vec<_>>()
                .join("\n\n"),
        );
    }

    text.trim().to_string()
}

/// Visible text of an HTML page, one blank line after each block element.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::with_capacity(html.len() / 2);
    collect_text(document.root_element(), &mut text);
    text.trim().to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
                if BLOCK_ELEMENTS.contains(&name) {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}

fn html_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    Html::parse_document(html)
        .select(&selector)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

async fn fetch_url(url: &str) -> AppResult<String> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::InvalidSource(format!("Unsupported URL: {}", url)));
    }

    tracing::debug!(url, "Fetching source");
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| AppError::InvalidSource(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::InvalidSource(format!("Failed to fetch {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::InvalidSource(format!(
            "Failed to fetch {}: HTTP {}",
            url, status
        )));
    }

    response
        .text()
        .await
        .map_err(|e| AppError::InvalidSource(format!("Failed to read body of {}: {}", url, e)))
}
