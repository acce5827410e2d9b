//! Persistence layer for saving/loading evaluation runs.
//!
//! Supports both JSON (human-readable) and bincode (efficient binary) formats.

use crate::error::{Result, ValidatorError};
use crate::generation::GenerationFailure;
use crate::model::{EvaluationRequest, ModelResponse};
use crate::scoring::{EffectivenessSummary, RunStats};
use crate::validation::ValidationSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where the CLI saves and looks for a run when no path is given.
pub const DEFAULT_RUN_PATH: &str = "data/evaluation_run.json";

/// Everything produced by one evaluation: inputs, answers, scores and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub judge_model: String,
    pub request: EvaluationRequest,
    pub responses: Vec<ModelResponse>,
    /// Candidates that never produced an answer.
    pub generation_failures: Vec<GenerationFailure>,
    pub results: ValidationSet,
    pub stats: BTreeMap<String, RunStats>,
    pub summary: EffectivenessSummary,
}

impl EvaluationRun {
    pub fn new(
        judge_model: impl Into<String>,
        request: EvaluationRequest,
        responses: Vec<ModelResponse>,
        results: ValidationSet,
        stats: BTreeMap<String, RunStats>,
        summary: EffectivenessSummary,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            created_at,
            judge_model: judge_model.into(),
            request,
            responses,
            generation_failures: Vec::new(),
            results,
            stats,
            summary,
        }
    }

    pub fn with_generation_failures(mut self, failures: Vec<GenerationFailure>) -> Self {
        self.generation_failures = failures;
        self
    }
}

/// Save format for evaluation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SaveFormat::Json,
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

/// Save a run, choosing the format from the file extension.
pub fn save_run(run: &EvaluationRun, path: &Path) -> Result<()> {
    save_run_with_format(run, path, SaveFormat::from_path(path))
}

pub fn save_run_with_format(run: &EvaluationRun, path: &Path, format: SaveFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| ValidatorError::io(parent, e))?;
        }
    }

    let data = match format {
        SaveFormat::Json => serde_json::to_string_pretty(run)
            .map_err(|e| ValidatorError::Serialization(e.to_string()))?
            .into_bytes(),
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            bincode::serde::encode_to_vec(run, config)
                .map_err(|e| ValidatorError::Serialization(e.to_string()))?
        }
    };

    fs::write(path, &data).map_err(|e| ValidatorError::io(path, e))?;

    Ok(())
}

/// Load a run, choosing the format from the file extension.
pub fn load_run(path: &Path) -> Result<EvaluationRun> {
    if !path.exists() {
        return Err(ValidatorError::RunNotFound(path.to_path_buf()));
    }

    load_run_with_format(path, SaveFormat::from_path(path))
}

pub fn load_run_with_format(path: &Path, format: SaveFormat) -> Result<EvaluationRun> {
    let data = fs::read(path).map_err(|e| ValidatorError::io(path, e))?;

    let run = match format {
        SaveFormat::Json => serde_json::from_slice(&data)
            .map_err(|e| ValidatorError::Serialization(e.to_string()))?,
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            let (run, _): (EvaluationRun, usize) = bincode::serde::decode_from_slice(&data, config)
                .map_err(|e| ValidatorError::Serialization(e.to_string()))?;
            run
        }
    };

    Ok(run)
}

/// Check if a run file exists at the given path.
pub fn run_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Get the size of a run file in bytes.
pub fn run_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| ValidatorError::io(path, e))?;
    Ok(metadata.len())
}
