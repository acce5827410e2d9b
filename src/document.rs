//! Loading context documents from disk.
//!
//! Only text-based formats are read here; every loader produces
//! `{source_id, text}` pairs tagged with the format they came from.
//! Binary office formats are expected to be converted to text upstream.

use crate::error::{Result, ValidatorError};
use crate::model::{AnswerSource, ContextDocument, ModelResponse, TokenUsage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

static HTML_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("Invalid script regex")
});
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("Invalid tag regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("Invalid blank line regex"));

/// Format a document was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Markdown,
    Csv,
    Html,
    Json,
}

impl DocumentKind {
    /// Determine kind from file extension; `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" | "text" | "log" => Some(DocumentKind::Text),
            "md" | "markdown" => Some(DocumentKind::Markdown),
            "csv" | "tsv" => Some(DocumentKind::Csv),
            "html" | "htm" => Some(DocumentKind::Html),
            "json" => Some(DocumentKind::Json),
            _ => None,
        }
    }
}

/// A context document plus the format it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub kind: DocumentKind,
    pub document: ContextDocument,
}

/// Strip markup from HTML, keeping paragraph breaks.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = HTML_SCRIPT.replace_all(html, "");
    let without_tags = HTML_TAG.replace_all(&without_scripts, "\n");
    let text = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Pull documents out of a JSON file.
///
/// An array of `{source_id|sourceId|id, text|content}` objects yields one
/// document per item; any other JSON is kept as a single pretty-printed
/// document named after the file.
fn documents_from_json(name: &str, content: &str) -> Result<Vec<ContextDocument>> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ValidatorError::Serialization(format!("{}: {}", name, e)))?;

    if let Value::Array(items) = &value {
        let docs: Vec<ContextDocument> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let text = item
                    .get("text")
                    .or_else(|| item.get("content"))
                    .and_then(Value::as_str)?;
                let source = item
                    .get("source_id")
                    .or_else(|| item.get("sourceId"))
                    .or_else(|| item.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}#{}", name, i + 1));
                Some(ContextDocument::new(source, text))
            })
            .collect();
        if !docs.is_empty() {
            return Ok(docs);
        }
    }

    let pretty = serde_json::to_string_pretty(&value)
        .map_err(|e| ValidatorError::Serialization(e.to_string()))?;
    Ok(vec![ContextDocument::new(name, pretty)])
}

/// Load one file. Returns an empty list for unsupported extensions.
pub fn load_file(path: &Path) -> Result<Vec<LoadedDocument>> {
    if !path.exists() {
        return Err(ValidatorError::DocumentNotFound(path.to_path_buf()));
    }
    let Some(kind) = DocumentKind::from_path(path) else {
        debug!(path = %path.display(), "skipping unsupported file");
        return Ok(Vec::new());
    };

    let content = std::fs::read_to_string(path).map_err(|e| ValidatorError::io(path, e))?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string();

    let documents = match kind {
        DocumentKind::Json => documents_from_json(&name, &content)?,
        DocumentKind::Html => vec![ContextDocument::new(name, html_to_text(&content))],
        DocumentKind::Text | DocumentKind::Markdown | DocumentKind::Csv => {
            vec![ContextDocument::new(name, content)]
        }
    };

    Ok(documents
        .into_iter()
        .filter(|d| !d.text.trim().is_empty())
        .map(|document| LoadedDocument { kind, document })
        .collect())
}

/// Load a file, or every supported file under a directory (sorted by path).
pub fn load_path(path: &Path) -> Result<Vec<LoadedDocument>> {
    if !path.exists() {
        return Err(ValidatorError::DocumentNotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return load_file(path);
    }

    let mut files: Vec<_> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| DocumentKind::from_path(p).is_some())
        .collect();
    files.sort();

    let mut loaded = Vec::new();
    for file in files {
        loaded.extend(load_file(&file)?);
    }

    if loaded.is_empty() {
        return Err(ValidatorError::EmptyCorpus(path.to_path_buf()));
    }
    Ok(loaded)
}

/// Load context documents from several files or directories, in order.
pub fn load_context_documents(paths: &[impl AsRef<Path>]) -> Result<Vec<ContextDocument>> {
    let mut documents = Vec::new();
    for path in paths {
        documents.extend(load_path(path.as_ref())?.into_iter().map(|l| l.document));
    }
    Ok(documents)
}

/// Pre-generated answers read from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct AnswerFile {
    pub query: Option<String>,
    pub documents: Vec<ContextDocument>,
    pub responses: Vec<ModelResponse>,
}

fn response_from_value(model_id: &str, value: Value) -> ModelResponse {
    let response_time_ms = value
        .get("response_time_ms")
        .or_else(|| value.get("responseTime"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let usage = value.get("usage").and_then(|u| {
        let input = u.get("input").or_else(|| u.get("prompt_tokens"))?.as_u64()?;
        let output = u.get("output").or_else(|| u.get("completion_tokens"))?.as_u64()?;
        Some(TokenUsage::reported(
            u32::try_from(input).unwrap_or(u32::MAX),
            u32::try_from(output).unwrap_or(u32::MAX),
        ))
    });

    let response = ModelResponse::new(model_id, AnswerSource::from_value(value).into_text())
        .with_response_time(response_time_ms);
    match usage {
        Some(usage) => response.with_usage(usage),
        None => response,
    }
}

/// Parse an answers document.
///
/// Accepts `{"query": .., "documents": [..], "answers": {model: answer}}` or
/// a bare `{model: answer}` map. Each answer may be a string or any shape
/// [`AnswerSource`] understands, optionally carrying `response_time_ms` and
/// `usage`.
pub fn parse_answers(content: &str) -> Result<AnswerFile> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ValidatorError::Serialization(format!("answers file: {}", e)))?;
    let Value::Object(mut root) = value else {
        return Err(ValidatorError::Serialization(
            "answers file must contain a JSON object".to_string(),
        ));
    };

    let (query, documents, answers) = match root.remove("answers") {
        Some(Value::Object(answers)) => {
            let query = root
                .get("query")
                .and_then(Value::as_str)
                .map(str::to_string);
            let documents = match root.remove("documents") {
                Some(docs) => serde_json::from_value(docs).map_err(|e| {
                    ValidatorError::Serialization(format!("answers file documents: {}", e))
                })?,
                None => Vec::new(),
            };
            (query, documents, answers)
        }
        Some(_) => {
            return Err(ValidatorError::Serialization(
                "\"answers\" must be an object keyed by model id".to_string(),
            ));
        }
        None => (None, Vec::new(), root),
    };

    let responses = answers
        .into_iter()
        .map(|(model_id, value)| response_from_value(&model_id, value))
        .collect();

    Ok(AnswerFile {
        query,
        documents,
        responses,
    })
}

/// Read and parse an answers file.
pub fn load_answers(path: &Path) -> Result<AnswerFile> {
    if !path.exists() {
        return Err(ValidatorError::DocumentNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| ValidatorError::io(path, e))?;
    parse_answers(&content)
}
