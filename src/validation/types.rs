//! Validation results and progress events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Score and rationale for a single criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    /// Score in [0, 100].
    pub score: f64,
    pub explanation: String,
}

/// Outcome of judging one model's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Scored {
        /// Keyed by normalized criterion name.
        criteria_scores: BTreeMap<String, CriterionScore>,
        overall_score: f64,
        overall_explanation: String,
    },
    Failed {
        error: String,
        /// Leading portion of the judge output, kept for debugging.
        raw_response: String,
    },
}

/// Exactly one per model per validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub model_id: String,
    pub outcome: ValidationOutcome,
}

impl ValidationResult {
    pub fn scored(
        model_id: impl Into<String>,
        criteria_scores: BTreeMap<String, CriterionScore>,
        overall_score: f64,
        overall_explanation: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            outcome: ValidationOutcome::Scored {
                criteria_scores,
                overall_score,
                overall_explanation: overall_explanation.into(),
            },
        }
    }

    pub fn failed(
        model_id: impl Into<String>,
        error: impl Into<String>,
        raw_response: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            outcome: ValidationOutcome::Failed {
                error: error.into(),
                raw_response: raw_response.into(),
            },
        }
    }

    /// Overall score, or `None` when evaluation failed.
    pub fn overall_score(&self) -> Option<f64> {
        match &self.outcome {
            ValidationOutcome::Scored { overall_score, .. } => Some(*overall_score),
            ValidationOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ValidationOutcome::Failed { error, .. } => Some(error),
            ValidationOutcome::Scored { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    pub fn criterion(&self, name: &str) -> Option<&CriterionScore> {
        match &self.outcome {
            ValidationOutcome::Scored {
                criteria_scores, ..
            } => criteria_scores.get(name),
            ValidationOutcome::Failed { .. } => None,
        }
    }
}

/// Results of one run keyed by model id. Iteration order is sorted by id.
pub type ValidationSet = BTreeMap<String, ValidationResult>;

/// Union of criterion names across a result set, sorted.
pub fn criterion_columns(results: &ValidationSet) -> Vec<String> {
    let mut columns: Vec<String> = results
        .values()
        .filter_map(|r| match &r.outcome {
            ValidationOutcome::Scored {
                criteria_scores, ..
            } => Some(criteria_scores.keys().cloned()),
            ValidationOutcome::Failed { .. } => None,
        })
        .flatten()
        .collect();
    columns.sort();
    columns.dedup();
    columns
}

/// Stage of a single model's judge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Started,
    Completed { failed: bool },
}

/// Progress notification emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationProgress {
    pub model_id: String,
    pub phase: ProgressPhase,
    /// Number of models finished so far, including this one for `Completed`.
    pub completed: usize,
    pub total: usize,
}
