//! Error types for the validator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Errors that can occur while building, validating or persisting evaluations.
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The document path does not exist.
    #[error("Document not found at '{0}'")]
    DocumentNotFound(PathBuf),

    /// A directory of context documents contained nothing loadable.
    #[error("No documents found at '{0}'")]
    EmptyCorpus(PathBuf),

    /// The saved run file does not exist.
    #[error("Evaluation run not found at '{0}'")]
    RunNotFound(PathBuf),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input data that cannot be analyzed (e.g. ragged embeddings).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Settings store error.
    #[error("Settings store error: {0}")]
    Settings(String),
}

impl ValidatorError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for ValidatorError {
    fn from(err: reqwest::Error) -> Self {
        ValidatorError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ValidatorError {
    fn from(err: serde_json::Error) -> Self {
        ValidatorError::LlmParse(err.to_string())
    }
}
