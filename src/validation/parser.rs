//! Turning raw judge output into a [`ValidationResult`].
//!
//! Judges do not always return bare JSON. Parsing runs a fixed cascade and
//! the first stage that yields a JSON object wins:
//!
//! 1. [`parse_direct`]: the whole text as JSON.
//! 2. [`parse_extracted`]: the outermost `{ ... }` span.
//! 3. [`parse_cleaned`]: the span (or whole text) after [`cleanup_json`].
//!
//! If every stage fails the result is a failure carrying a preview of the
//! raw text. Shape problems inside a parsed object (missing criteria,
//! non-numeric scores) are repaired with defaults rather than reported.

use crate::model::{EvaluationRequest, normalize_criterion_name};
use crate::validation::types::{CriterionScore, ValidationResult};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Score used when the judge omits a score or gives an unusable one.
pub const MIDPOINT_SCORE: f64 = 50.0;

/// Characters of raw judge output kept on a parse failure.
pub const RAW_PREVIEW_CHARS: usize = 500;

const MISSING_CRITERION_NOTE: &str = "The judge did not score this criterion.";

// Greedy on purpose: first '{' through last '}'.
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("Invalid JSON object regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("Invalid trailing comma regex"));
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("Invalid number regex"));

/// Which cascade stage produced the parsed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Direct,
    Extracted,
    Cleaned,
}

/// Stage 1: parse the full text.
pub fn parse_direct(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(Value::is_object)
}

/// The outermost brace-delimited span, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

/// Stage 2: parse the outermost `{ ... }` span.
pub fn parse_extracted(text: &str) -> Option<Value> {
    extract_json_object(text).and_then(parse_direct)
}

/// Repair common judge mistakes: escaped quotes, raw newlines, trailing commas.
pub fn cleanup_json(text: &str) -> String {
    let unescaped = text.replace("\\\"", "\"");
    let collapsed = WHITESPACE_RUN.replace_all(&unescaped, " ");
    TRAILING_COMMA.replace_all(&collapsed, "$1").trim().to_string()
}

/// Stage 3: clean up the span (or the whole text) and parse again.
pub fn parse_cleaned(text: &str) -> Option<Value> {
    let candidate = extract_json_object(text).unwrap_or(text);
    let cleaned = cleanup_json(candidate);
    parse_direct(&cleaned).or_else(|| parse_extracted(&cleaned))
}

/// Run the cascade.
pub fn parse_judge_json(text: &str) -> Option<(Value, ParseStage)> {
    if let Some(value) = parse_direct(text) {
        return Some((value, ParseStage::Direct));
    }
    if let Some(value) = parse_extracted(text) {
        return Some((value, ParseStage::Extracted));
    }
    parse_cleaned(text).map(|value| (value, ParseStage::Cleaned))
}

/// Coerce a judge-provided score into a finite number in [0, 100].
///
/// Accepts numbers, numeric strings (`"85"`, `"85/100"`, `"85%"`) and
/// objects with a `score` field. Anything else becomes the midpoint.
pub fn coerce_score(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => LEADING_NUMBER
            .find(s)
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        Some(Value::Object(map)) => return coerce_score(map.get("score")),
        _ => None,
    };

    match raw {
        Some(score) if score.is_finite() => score.clamp(0.0, 100.0),
        _ => MIDPOINT_SCORE,
    }
}

fn explanation_of(value: &Value) -> String {
    ["explanation", "reason", "reasoning", "feedback"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Collect `(name, entry)` pairs from either an object or an array of
/// `{name, score, explanation}` items.
fn criteria_entries(parsed: &Value) -> Vec<(String, Value)> {
    let section = parsed.get("criteria").or_else(|| parsed.get("scores"));
    match section {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let name = item
                    .get("name")
                    .or_else(|| item.get("criterion"))
                    .and_then(Value::as_str)?;
                Some((name.to_string(), item.clone()))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn overall_of(parsed: &Value) -> (Option<f64>, String) {
    if let Some(overall) = parsed.get("overall") {
        return match overall {
            Value::Object(_) => {
                let score = overall.get("score").map(|s| coerce_score(Some(s)));
                (score, explanation_of(overall))
            }
            other => (Some(coerce_score(Some(other))), String::new()),
        };
    }

    let flat = parsed
        .get("overall_score")
        .or_else(|| parsed.get("overallScore"));
    let explanation = parsed
        .get("overall_explanation")
        .or_else(|| parsed.get("overallExplanation"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    (flat.map(|s| coerce_score(Some(s))), explanation)
}

/// Build a scored result from an already-parsed judge object.
pub fn normalize_parsed(
    model_id: &str,
    parsed: &Value,
    requested_criteria: &[&str],
) -> ValidationResult {
    let mut criteria_scores: BTreeMap<String, CriterionScore> = BTreeMap::new();

    for (name, entry) in criteria_entries(parsed) {
        let key = normalize_criterion_name(&name);
        if key.is_empty() {
            continue;
        }
        let (score, explanation) = match &entry {
            Value::Object(_) => (coerce_score(entry.get("score")), explanation_of(&entry)),
            other => (coerce_score(Some(other)), String::new()),
        };
        criteria_scores
            .entry(key)
            .or_insert(CriterionScore { score, explanation });
    }

    for name in requested_criteria {
        let key = normalize_criterion_name(name);
        if key.is_empty() {
            continue;
        }
        criteria_scores.entry(key).or_insert_with(|| CriterionScore {
            score: MIDPOINT_SCORE,
            explanation: MISSING_CRITERION_NOTE.to_string(),
        });
    }

    let (overall, overall_explanation) = overall_of(parsed);
    let overall_score = overall.unwrap_or_else(|| {
        if criteria_scores.is_empty() {
            MIDPOINT_SCORE
        } else {
            criteria_scores.values().map(|c| c.score).sum::<f64>() / criteria_scores.len() as f64
        }
    });

    ValidationResult::scored(model_id, criteria_scores, overall_score, overall_explanation)
}

/// First [`RAW_PREVIEW_CHARS`] characters of the raw text.
pub fn raw_preview(raw: &str) -> String {
    raw.chars().take(RAW_PREVIEW_CHARS).collect()
}

/// Parse and normalize a raw judge response. Never fails: unparseable text
/// becomes a failed result.
pub fn parse_judge_response(
    model_id: &str,
    raw: &str,
    request: &EvaluationRequest,
) -> ValidationResult {
    match parse_judge_json(raw) {
        Some((parsed, stage)) => {
            if stage != ParseStage::Direct {
                debug!(model = model_id, ?stage, "judge output needed fallback parsing");
            }
            normalize_parsed(model_id, &parsed, &request.criterion_names())
        }
        None => {
            warn!(model = model_id, "judge output contained no parseable JSON");
            ValidationResult::failed(
                model_id,
                "Failed to parse judge response as JSON",
                raw_preview(raw),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Criterion;
    use crate::validation::types::ValidationOutcome;
    use serde_json::json;

    fn request(criteria: &str) -> EvaluationRequest {
        EvaluationRequest::new("What is the capital of France?", vec![], Criterion::parse_list(criteria))
    }

    const SCENARIO: &str = r#"{"criteria":{"Accuracy":{"score":95,"explanation":"correct"},"Clarity":{"score":90,"explanation":"clear"}},"overall":{"score":92,"explanation":"good"}}"#;

    #[test]
    fn test_scenario_response() {
        let result = parse_judge_response("gpt-4o", SCENARIO, &request("Accuracy, Clarity"));
        assert_eq!(result.overall_score(), Some(92.0));
        match &result.outcome {
            ValidationOutcome::Scored {
                criteria_scores,
                overall_explanation,
                ..
            } => {
                assert_eq!(criteria_scores.len(), 2);
                assert_eq!(criteria_scores["Accuracy"].score, 95.0);
                assert_eq!(criteria_scores["Clarity"].explanation, "clear");
                assert_eq!(overall_explanation, "good");
            }
            other => panic!("expected scored result, got {:?}", other),
        }
    }

    #[test]
    fn test_cascade_stages() {
        assert_eq!(parse_judge_json(SCENARIO).map(|(_, s)| s), Some(ParseStage::Direct));

        let wrapped = format!("Here is my evaluation:\n```json\n{}\n```\nThanks.", SCENARIO);
        assert_eq!(parse_judge_json(&wrapped).map(|(_, s)| s), Some(ParseStage::Extracted));

        let sloppy = "Result: {\"overall\": {\"score\": 80, \"explanation\": \"ok\",},}";
        assert_eq!(parse_judge_json(sloppy).map(|(_, s)| s), Some(ParseStage::Cleaned));

        let escaped = r#"{\"overall\": {\"score\": 70}}"#;
        assert_eq!(parse_judge_json(escaped).map(|(_, s)| s), Some(ParseStage::Cleaned));
    }

    #[test]
    fn test_cleanup_json() {
        assert_eq!(cleanup_json("{\"a\": [1, 2,],\n\n}"), "{\"a\": [1, 2]}");
        assert_eq!(cleanup_json(r#"{\"a\": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_garbage_is_failed_result() {
        let garbage = "I cannot evaluate this answer. ".repeat(40);
        let result = parse_judge_response("m", &garbage, &request("Accuracy"));
        assert!(result.is_error());
        match result.outcome {
            ValidationOutcome::Failed { raw_response, .. } => {
                assert_eq!(raw_response.chars().count(), RAW_PREVIEW_CHARS);
            }
            other => panic!("expected failure, got {:?}", other),
        }

        for text in ["", "42", "{not json at all}", "[1, 2, 3]", "\"just a string\""] {
            assert!(parse_judge_response("m", text, &request("Accuracy")).is_error(), "{text}");
        }
    }

    #[test]
    fn test_raw_preview_is_char_safe() {
        let text = "é".repeat(600);
        assert_eq!(raw_preview(&text).chars().count(), RAW_PREVIEW_CHARS);
    }

    #[test]
    fn test_scores_clamped_and_defaulted() {
        let parsed = json!({
            "criteria": {
                "accuracy": {"score": 150, "explanation": "too high"},
                "CLARITY": {"score": -20},
                "tone": {"score": "n/a"},
                "depth": "85/100",
                "brevity": {"explanation": "no score"}
            },
            "overall": {"score": "95%"}
        });
        let result = normalize_parsed("m", &parsed, &[]);

        assert_eq!(result.criterion("Accuracy").unwrap().score, 100.0);
        assert_eq!(result.criterion("Clarity").unwrap().score, 0.0);
        assert_eq!(result.criterion("Tone").unwrap().score, MIDPOINT_SCORE);
        assert_eq!(result.criterion("Depth").unwrap().score, 85.0);
        assert_eq!(result.criterion("Brevity").unwrap().score, MIDPOINT_SCORE);
        assert_eq!(result.overall_score(), Some(95.0));
    }

    #[test]
    fn test_missing_requested_criteria_filled() {
        let parsed = json!({"criteria": {"accuracy": {"score": 80}}, "overall": {"score": 75}});
        let result = normalize_parsed("m", &parsed, &["Accuracy", "Clarity"]);

        assert_eq!(result.criterion("Accuracy").unwrap().score, 80.0);
        let clarity = result.criterion("Clarity").unwrap();
        assert_eq!(clarity.score, MIDPOINT_SCORE);
        assert_eq!(clarity.explanation, MISSING_CRITERION_NOTE);
    }

    #[test]
    fn test_overall_falls_back_to_mean_then_midpoint() {
        let parsed = json!({"criteria": {"a": {"score": 60}, "b": {"score": 80}}});
        assert_eq!(normalize_parsed("m", &parsed, &[]).overall_score(), Some(70.0));

        assert_eq!(normalize_parsed("m", &json!({}), &[]).overall_score(), Some(MIDPOINT_SCORE));

        let flat = json!({"overallScore": 64, "overallExplanation": "meh"});
        assert_eq!(normalize_parsed("m", &flat, &[]).overall_score(), Some(64.0));
    }

    #[test]
    fn test_array_shaped_criteria() {
        let parsed = json!({
            "scores": [
                {"name": "accuracy", "score": 70, "reason": "mostly right"},
                {"criterion": "Clarity", "score": 60}
            ],
            "overall": 65
        });
        let result = normalize_parsed("m", &parsed, &[]);
        assert_eq!(result.criterion("Accuracy").unwrap().explanation, "mostly right");
        assert_eq!(result.criterion("Clarity").unwrap().score, 60.0);
        assert_eq!(result.overall_score(), Some(65.0));
    }

    #[test]
    fn test_all_scores_in_range_for_valid_json() {
        let responses = [
            json!({"criteria": {"x": {"score": 1e300}}, "overall": {"score": -1e300}}),
            json!({"criteria": {"x": {"score": 42.5}}, "overall": {"score": 100}}),
            json!({"criteria": {"x": {"score": null}}, "overall": {"score": 0}}),
        ];
        for parsed in responses {
            let result = normalize_parsed("m", &parsed, &["x"]);
            let overall = result.overall_score().unwrap();
            assert!((0.0..=100.0).contains(&overall));
            assert!((0.0..=100.0).contains(&result.criterion("X").unwrap().score));
        }
    }
}
