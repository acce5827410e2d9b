//! Plain-text and JSON rendering of evaluation runs.

use crate::analysis::{ChunkStats, EmbeddingStats};
use crate::persistence::EvaluationRun;
use crate::scoring::EffectivenessSummary;
use crate::validation::{ValidationOutcome, ValidationSet, criterion_columns};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

const MODEL_WIDTH: usize = 24;
const COLUMN_WIDTH: usize = 12;

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

/// One row per model, one column per criterion, then overall/cost/time/efficiency.
pub fn comparison_table(run: &EvaluationRun) -> String {
    render_table(&run.results, &run.summary)
}

pub fn render_table(results: &ValidationSet, summary: &EffectivenessSummary) -> String {
    let columns = criterion_columns(results);
    let mut out = String::new();

    let _ = write!(out, "{:<width$}", "Model", width = MODEL_WIDTH);
    for column in &columns {
        let _ = write!(out, " {:>width$}", truncate(column, COLUMN_WIDTH), width = COLUMN_WIDTH);
    }
    let _ = writeln!(
        out,
        " {:>8} {:>10} {:>9} {:>10}",
        "Overall", "Cost ($)", "Time (ms)", "Efficiency"
    );
    let line_width = MODEL_WIDTH + columns.len() * (COLUMN_WIDTH + 1) + 41;
    let _ = writeln!(out, "{}", "─".repeat(line_width));

    for (model_id, result) in results {
        let _ = write!(out, "{:<width$}", truncate(model_id, MODEL_WIDTH), width = MODEL_WIDTH);

        if let Some(error) = result.error() {
            let _ = writeln!(out, " ERROR: {}", truncate(error, 60));
            continue;
        }

        for column in &columns {
            match result.criterion(column) {
                Some(score) => {
                    let _ = write!(out, " {:>width$.1}", score.score, width = COLUMN_WIDTH);
                }
                None => {
                    let _ = write!(out, " {:>width$}", "-", width = COLUMN_WIDTH);
                }
            }
        }

        let overall = result.overall_score().unwrap_or_default();
        match summary.per_model.get(model_id) {
            Some(m) => {
                let _ = writeln!(
                    out,
                    " {:>8.1} {:>10.6} {:>9} {:>10.1}",
                    overall, m.cost, m.response_time_ms, m.efficiency_score
                );
            }
            None => {
                let _ = writeln!(out, " {:>8.1} {:>10} {:>9} {:>10}", overall, "-", "-", "-");
            }
        }
    }

    out
}

/// The three headline picks.
pub fn summary_lines(summary: &EffectivenessSummary) -> String {
    let pick = |model: &Option<String>| model.clone().unwrap_or_else(|| "n/a".to_string());
    format!(
        "Most effective:   {}\nHighest scoring:  {}\nCheapest good:    {}\n",
        pick(&summary.most_effective_model),
        pick(&summary.highest_scoring_model),
        pick(&summary.cheapest_good_model)
    )
}

/// Judge explanations, per model and criterion.
pub fn explanations(results: &ValidationSet) -> String {
    let mut out = String::new();
    for (model_id, result) in results {
        let _ = writeln!(out, "{}", model_id);
        match &result.outcome {
            ValidationOutcome::Scored {
                criteria_scores,
                overall_explanation,
                ..
            } => {
                for (name, score) in criteria_scores {
                    let _ = writeln!(out, "  • {} ({:.0}): {}", name, score.score, score.explanation);
                }
                let _ = writeln!(out, "  Overall: {}", overall_explanation);
            }
            ValidationOutcome::Failed { error, raw_response } => {
                let _ = writeln!(out, "  Error: {}", error);
                if !raw_response.is_empty() {
                    let _ = writeln!(out, "  Raw: {}", truncate(raw_response, 200));
                }
            }
        }
    }
    out
}

/// Full plain-text report for a saved or fresh run.
pub fn render_run(run: &EvaluationRun, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Query: {}", run.request.query);
    let _ = writeln!(out, "Judge: {}", run.judge_model);
    let _ = writeln!(
        out,
        "Context documents: {}  Criteria: {}",
        run.request.context_documents.len(),
        run.request
            .criteria
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = writeln!(out);
    out.push_str(&comparison_table(run));
    let _ = writeln!(out);
    out.push_str(&summary_lines(&run.summary));

    if !run.generation_failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Models without an answer:");
        for failure in &run.generation_failures {
            let _ = writeln!(out, "  {}: {}", failure.model_id, failure.error);
        }
    }

    if verbose {
        let _ = writeln!(out);
        out.push_str(&explanations(&run.results));
    }
    out
}

/// Print a run in the requested format.
pub fn print_run(run: &EvaluationRun, format: OutputFormat, verbose: bool) {
    match format {
        OutputFormat::Plain => print!("{}", render_run(run, verbose)),
        OutputFormat::Json => print_json(run),
    }
}

pub fn render_chunk_stats(stats: &ChunkStats) -> String {
    format!(
        "Chunks: {}\nMean length: {:.1} chars\nMin length: {} chars\nMax length: {} chars\n",
        stats.count, stats.mean_chars, stats.min_chars, stats.max_chars
    )
}

pub fn render_embedding_stats(stats: &EmbeddingStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Vectors: {}  Dimension: {}", stats.count, stats.dimension);
    let _ = writeln!(out, "Mean norm: {:.4}", stats.mean_norm);
    let _ = writeln!(out, "Total variance: {:.6}", stats.total_variance());
    match &stats.cosine {
        Some(c) => {
            let _ = writeln!(
                out,
                "Pairwise cosine: mean {:.4}, min {:.4}, max {:.4}",
                c.mean, c.min, c.max
            );
        }
        None => {
            let _ = writeln!(out, "Pairwise cosine: n/a (single vector)");
        }
    }
    match &stats.principal {
        Some(pc) => {
            let _ = writeln!(
                out,
                "Principal direction explains {:.1}% of variance",
                pc.explained_variance_ratio * 100.0
            );
        }
        None => {
            let _ = writeln!(out, "Principal direction: n/a (no variance)");
        }
    }
    out
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvaluationRequest, ModelResponse};
    use crate::scoring::{ModelEffectiveness, RunStats};
    use crate::validation::{CriterionScore, ValidationResult};
    use std::collections::BTreeMap;

    fn score(value: f64) -> CriterionScore {
        CriterionScore {
            score: value,
            explanation: format!("scored {}", value),
        }
    }

    fn sample_run() -> EvaluationRun {
        let mut results = ValidationSet::new();
        results.insert(
            "gpt-4o".to_string(),
            ValidationResult::scored(
                "gpt-4o",
                BTreeMap::from([
                    ("Accuracy".to_string(), score(95.0)),
                    ("Clarity".to_string(), score(88.0)),
                ]),
                92.0,
                "solid",
            ),
        );
        results.insert(
            "llama3".to_string(),
            ValidationResult::scored(
                "llama3",
                BTreeMap::from([("Accuracy".to_string(), score(70.0))]),
                72.0,
                "ok",
            ),
        );
        results.insert(
            "mistral".to_string(),
            ValidationResult::failed("mistral", "Failed to parse JSON", "{oops"),
        );

        let summary = EffectivenessSummary {
            most_effective_model: Some("llama3".to_string()),
            highest_scoring_model: Some("gpt-4o".to_string()),
            cheapest_good_model: Some("llama3".to_string()),
            per_model: BTreeMap::from([
                (
                    "gpt-4o".to_string(),
                    ModelEffectiveness {
                        cost: 0.00125,
                        score: 92.0,
                        response_time_ms: 900,
                        efficiency_score: 60.5,
                    },
                ),
                (
                    "llama3".to_string(),
                    ModelEffectiveness {
                        cost: 0.0,
                        score: 72.0,
                        response_time_ms: 400,
                        efficiency_score: 1000.0,
                    },
                ),
            ]),
        };

        EvaluationRun::new(
            "judge",
            EvaluationRequest::new("What is the capital?", vec![], vec![]),
            vec![ModelResponse::new("gpt-4o", "Paris")],
            results,
            BTreeMap::from([("gpt-4o".to_string(), RunStats::default())]),
            summary,
        )
    }

    #[test]
    fn test_table_has_row_per_model_and_criterion_columns() {
        let table = comparison_table(&sample_run());
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("Model"));
        assert!(lines[0].contains("Accuracy"));
        assert!(lines[0].contains("Clarity"));
        assert_eq!(lines.len(), 2 + 3);

        assert!(lines[2].starts_with("gpt-4o"));
        assert!(lines[2].contains("95.0"));
        assert!(lines[2].contains("0.001250"));
        // llama3 has no Clarity score
        assert!(lines[3].contains(" -"));
        assert!(lines[4].contains("ERROR: Failed to parse JSON"));
    }

    #[test]
    fn test_summary_lines() {
        let text = summary_lines(&sample_run().summary);
        assert!(text.contains("Most effective:   llama3"));
        assert!(text.contains("Highest scoring:  gpt-4o"));

        let empty = summary_lines(&EffectivenessSummary::default());
        assert_eq!(empty.matches("n/a").count(), 3);
    }

    #[test]
    fn test_render_run_verbose_includes_explanations() {
        let run = sample_run();
        let brief = render_run(&run, false);
        let verbose = render_run(&run, true);

        assert!(brief.contains("Query: What is the capital?"));
        assert!(!brief.contains("scored 95"));
        assert!(verbose.contains("Accuracy (95): scored 95"));
        assert!(verbose.contains("Raw: {oops"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_json_output() {
        // Serialization must not panic
        print_json(&sample_run());
    }
}
