//! Cost lookup and model ranking.
//!
//! Rankings are recomputed from a snapshot of results every time; nothing
//! here keeps state between calls.

use crate::error::{Result, ValidatorError};
use crate::generation::build_answer_prompt;
use crate::model::{EvaluationRequest, ModelResponse, TokenUsage};
use crate::validation::ValidationSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Price of a model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing::new(0.0, 0.0);

    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost in USD for the given usage.
    pub fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input as f64 * self.input_per_million + usage.output as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

// Published list prices; override or extend them through config.
const BUILTIN_PRICES: &[(&str, ModelPricing)] = &[
    ("gpt-4o", ModelPricing::new(2.50, 10.00)),
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.60)),
    ("gpt-4-turbo", ModelPricing::new(10.00, 30.00)),
    ("gpt-3.5-turbo", ModelPricing::new(0.50, 1.50)),
    ("claude-3-5-sonnet", ModelPricing::new(3.00, 15.00)),
    ("claude-3-5-haiku", ModelPricing::new(0.80, 4.00)),
    ("claude-3-opus", ModelPricing::new(15.00, 75.00)),
];

/// Maps a model id and its token usage to a cost in USD.
pub trait CostModel {
    fn cost(&self, model_id: &str, usage: &TokenUsage) -> f64;
}

/// Price lookup by model id.
///
/// Lookup tries the exact id, then the id without its endpoint prefix
/// (`azure/gpt-4o` -> `gpt-4o`), then the default price. Models with no
/// match and no default are free.
#[derive(Debug, Clone, Default)]
pub struct CostTable {
    prices: BTreeMap<String, ModelPricing>,
    default: Option<ModelPricing>,
}

impl CostTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-filled with well-known list prices.
    pub fn with_builtin_prices() -> Self {
        let mut table = Self::new();
        for (model, pricing) in BUILTIN_PRICES {
            table.insert(*model, *pricing);
        }
        table
    }

    pub fn with_default(mut self, pricing: ModelPricing) -> Self {
        self.default = Some(pricing);
        self
    }

    pub fn insert(&mut self, model_id: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model_id.into(), pricing);
    }

    pub fn get(&self, model_id: &str) -> Option<ModelPricing> {
        if let Some(pricing) = self.prices.get(model_id) {
            return Some(*pricing);
        }
        if let Some((_, bare)) = model_id.split_once('/') {
            if let Some(pricing) = self.prices.get(bare) {
                return Some(*pricing);
            }
        }
        self.default
    }
}

impl CostModel for CostTable {
    fn cost(&self, model_id: &str, usage: &TokenUsage) -> f64 {
        self.get(model_id)
            .map(|pricing| pricing.calculate_cost(usage))
            .unwrap_or(0.0)
    }
}

/// Weighting for the most-effective-model pick.
///
/// Paid models score `quality * (cw * cost_factor + sw * speed_factor) / (cw + sw)`
/// where `cost_factor` is the cheapest paid cost divided by the model's cost
/// and `speed_factor` is the fastest response time divided by the model's.
/// Free models have no cost ratio; they get
/// `free_model_score * (cw + sw * speed_factor) / (cw + sw)`, so between two
/// free models the faster one wins. Weights `(1, 0)` give every free model
/// the same flat score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectivenessPolicy {
    pub cost_weight: f64,
    pub speed_weight: f64,
    /// Minimum overall score for the budget pick.
    pub good_score_threshold: f64,
    /// Base effectiveness granted to free models.
    pub free_model_score: f64,
}

impl Default for EffectivenessPolicy {
    fn default() -> Self {
        Self {
            cost_weight: 0.25,
            speed_weight: 0.75,
            good_score_threshold: 70.0,
            free_model_score: 1000.0,
        }
    }
}

impl EffectivenessPolicy {
    pub fn validate(&self) -> Result<()> {
        let weights = [self.cost_weight, self.speed_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ValidatorError::InvalidConfig(
                "effectiveness weights must be finite and non-negative".to_string(),
            ));
        }
        if self.cost_weight + self.speed_weight <= 0.0 {
            return Err(ValidatorError::InvalidConfig(
                "at least one effectiveness weight must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.good_score_threshold) {
            return Err(ValidatorError::InvalidConfig(
                "good_score_threshold must be within [0, 100]".to_string(),
            ));
        }
        if !self.free_model_score.is_finite() {
            return Err(ValidatorError::InvalidConfig(
                "free_model_score must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cost and latency of one model's answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// USD.
    pub cost: f64,
    pub response_time_ms: u64,
}

/// Compute cost and latency for each response.
///
/// Responses without reported usage are costed from an estimate of the
/// candidate prompt built from `request` plus the answer text, the same
/// estimate answer generation records.
pub fn run_stats(
    request: &EvaluationRequest,
    responses: &[ModelResponse],
    costs: &dyn CostModel,
) -> BTreeMap<String, RunStats> {
    let prompt = build_answer_prompt(request);
    responses
        .iter()
        .map(|response| {
            let usage = response
                .token_usage
                .unwrap_or_else(|| TokenUsage::estimate(&prompt, &response.answer_text));
            (
                response.model_id.clone(),
                RunStats {
                    cost: costs.cost(&response.model_id, &usage),
                    response_time_ms: response.response_time_ms,
                },
            )
        })
        .collect()
}

/// Per-model figures behind the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEffectiveness {
    pub cost: f64,
    pub score: f64,
    pub response_time_ms: u64,
    pub efficiency_score: f64,
}

/// Derived ranking over one result set. Recompute instead of updating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessSummary {
    pub most_effective_model: Option<String>,
    pub highest_scoring_model: Option<String>,
    /// Cheapest model at or above the good-score threshold.
    pub cheapest_good_model: Option<String>,
    /// Only models that were scored successfully.
    pub per_model: BTreeMap<String, ModelEffectiveness>,
}

fn is_paid(cost: f64) -> bool {
    cost.is_finite() && cost > 0.0
}

/// Index of the first maximum under `key`, in iteration order.
fn first_max<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, item) in items.iter().enumerate() {
        let value = key(item);
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}

/// Rank the scored models in `results`.
///
/// Failed results are excluded from every pick. Models missing from
/// `stats` are treated as free with zero latency. Ties keep the model that
/// comes first in iteration order (ascending model id).
pub fn summarize(
    results: &ValidationSet,
    stats: &BTreeMap<String, RunStats>,
    policy: &EffectivenessPolicy,
) -> EffectivenessSummary {
    let policy = match policy.validate() {
        Ok(()) => *policy,
        Err(e) => {
            warn!(error = %e, "invalid effectiveness policy, using defaults");
            EffectivenessPolicy::default()
        }
    };

    let scored: Vec<(&String, f64, RunStats)> = results
        .iter()
        .filter_map(|(model_id, result)| {
            let score = result.overall_score()?;
            let run = stats.get(model_id).copied().unwrap_or_default();
            Some((model_id, score, run))
        })
        .collect();

    if scored.is_empty() {
        return EffectivenessSummary::default();
    }

    let fastest = scored
        .iter()
        .map(|(_, _, run)| run.response_time_ms)
        .filter(|t| *t > 0)
        .min();
    let speed_factor = |time_ms: u64| match (time_ms, fastest) {
        (0, _) | (_, None) => 1.0,
        (t, Some(fast)) => fast as f64 / t as f64,
    };

    let cheapest_paid = scored
        .iter()
        .map(|(_, _, run)| run.cost)
        .filter(|c| is_paid(*c))
        .fold(f64::INFINITY, f64::min);

    let weight_sum = policy.cost_weight + policy.speed_weight;
    let efficiency = |score: f64, run: &RunStats| {
        let speed = speed_factor(run.response_time_ms);
        if is_paid(run.cost) {
            let cost_factor = cheapest_paid / run.cost;
            score * (policy.cost_weight * cost_factor + policy.speed_weight * speed) / weight_sum
        } else {
            policy.free_model_score * (policy.cost_weight + policy.speed_weight * speed)
                / weight_sum
        }
    };

    let per_model: BTreeMap<String, ModelEffectiveness> = scored
        .iter()
        .map(|(model_id, score, run)| {
            (
                (*model_id).clone(),
                ModelEffectiveness {
                    cost: run.cost,
                    score: *score,
                    response_time_ms: run.response_time_ms,
                    efficiency_score: efficiency(*score, run),
                },
            )
        })
        .collect();

    let highest = first_max(&scored, |(_, score, _)| *score);

    let good: Vec<&(&String, f64, RunStats)> = scored
        .iter()
        .filter(|(_, score, _)| *score >= policy.good_score_threshold)
        .collect();
    let cheapest_good = first_max(&good, |(_, _, run)| -run.cost).map(|i| good[i].0.clone());

    let most_effective = first_max(&scored, |(model_id, _, _)| {
        per_model[model_id.as_str()].efficiency_score
    });

    EffectivenessSummary {
        most_effective_model: most_effective.map(|i| scored[i].0.clone()),
        highest_scoring_model: highest.map(|i| scored[i].0.clone()),
        cheapest_good_model: cheapest_good,
        per_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationResult;

    fn result_set(entries: &[(&str, Option<f64>)]) -> ValidationSet {
        entries
            .iter()
            .map(|(model, score)| {
                let result = match score {
                    Some(s) => ValidationResult::scored(*model, BTreeMap::new(), *s, ""),
                    None => ValidationResult::failed(*model, "network error", ""),
                };
                (model.to_string(), result)
            })
            .collect()
    }

    fn stats(entries: &[(&str, f64, u64)]) -> BTreeMap<String, RunStats> {
        entries
            .iter()
            .map(|(model, cost, ms)| {
                (
                    model.to_string(),
                    RunStats {
                        cost: *cost,
                        response_time_ms: *ms,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_pricing_cost() {
        // 1K input + 1K output at $2.50/$10.00 per million
        let cost = ModelPricing::new(2.5, 10.0).calculate_cost(&TokenUsage::reported(1_000, 1_000));
        assert!((cost - 0.0125).abs() < 1e-12);
    }

    #[test]
    fn test_cost_table_lookup() {
        let table = CostTable::with_builtin_prices();
        assert!(table.get("gpt-4o").is_some());
        assert_eq!(table.get("azure/gpt-4o"), table.get("gpt-4o"));
        assert!(table.get("llama3").is_none());
        assert_eq!(table.cost("ollama/llama3", &TokenUsage::reported(500, 500)), 0.0);

        let with_default = CostTable::new().with_default(ModelPricing::new(1.0, 1.0));
        assert_eq!(with_default.cost("anything", &TokenUsage::reported(1_000_000, 0)), 1.0);
    }

    #[test]
    fn test_run_stats_estimates_missing_usage() {
        let table = CostTable::new().with_default(ModelPricing::new(0.0, 1_000_000.0));
        let responses = vec![
            ModelResponse::new("a", "one two three").with_response_time(120),
            ModelResponse::new("b", "x")
                .with_usage(TokenUsage::reported(0, 10))
                .with_response_time(80),
        ];
        let stats = run_stats(&EvaluationRequest::new("q", vec![], vec![]), &responses, &table);
        assert_eq!(stats["a"].cost, 4.0); // 3 words -> 4 tokens at $1 each
        assert_eq!(stats["a"].response_time_ms, 120);
        assert_eq!(stats["b"].cost, 10.0);
    }

    #[test]
    fn test_tie_on_top_score_is_deterministic() {
        let results = result_set(&[("zeta", Some(88.0)), ("alpha", Some(88.0)), ("mid", Some(70.0))]);
        let run = stats(&[("zeta", 0.01, 100), ("alpha", 0.01, 100), ("mid", 0.01, 100)]);

        let first = summarize(&results, &run, &EffectivenessPolicy::default());
        for _ in 0..10 {
            let again = summarize(&results, &run, &EffectivenessPolicy::default());
            assert_eq!(again.highest_scoring_model, first.highest_scoring_model);
        }
        assert_eq!(first.highest_scoring_model.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_free_model_is_cheapest_good() {
        let results = result_set(&[("gpt-4o", Some(85.0)), ("llama3", Some(75.0))]);
        let run = stats(&[("gpt-4o", 0.02, 900), ("llama3", 0.0, 3000)]);

        let summary = summarize(&results, &run, &EffectivenessPolicy::default());
        assert_eq!(summary.cheapest_good_model.as_deref(), Some("llama3"));
        assert_eq!(summary.highest_scoring_model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_no_model_clears_threshold() {
        let results = result_set(&[("a", Some(60.0)), ("b", Some(69.9))]);
        let summary = summarize(&results, &BTreeMap::new(), &EffectivenessPolicy::default());
        assert_eq!(summary.cheapest_good_model, None);
        assert_eq!(summary.highest_scoring_model.as_deref(), Some("b"));
    }

    #[test]
    fn test_failed_results_excluded() {
        let results = result_set(&[("broken", None), ("ok", Some(40.0))]);
        let summary = summarize(&results, &BTreeMap::new(), &EffectivenessPolicy::default());
        assert_eq!(summary.highest_scoring_model.as_deref(), Some("ok"));
        assert_eq!(summary.most_effective_model.as_deref(), Some("ok"));
        assert!(!summary.per_model.contains_key("broken"));

        let all_failed = result_set(&[("broken", None)]);
        assert_eq!(
            summarize(&all_failed, &BTreeMap::new(), &EffectivenessPolicy::default()),
            EffectivenessSummary::default()
        );
    }

    #[test]
    fn test_fast_free_model_beats_slow_free_model() {
        let results = result_set(&[("free-slow", Some(90.0)), ("free-fast", Some(60.0)), ("paid", Some(95.0))]);
        let run = stats(&[("free-slow", 0.0, 4000), ("free-fast", 0.0, 1000), ("paid", 0.05, 500)]);

        let summary = summarize(&results, &run, &EffectivenessPolicy::default());
        assert_eq!(summary.most_effective_model.as_deref(), Some("free-fast"));
        let fast = summary.per_model["free-fast"].efficiency_score;
        let slow = summary.per_model["free-slow"].efficiency_score;
        let paid = summary.per_model["paid"].efficiency_score;
        assert!(fast > slow);
        assert!(slow > paid);
    }

    #[test]
    fn test_cost_only_policy_gives_free_models_flat_score() {
        let results = result_set(&[("free-slow", Some(90.0)), ("free-fast", Some(60.0))]);
        let run = stats(&[("free-slow", 0.0, 4000), ("free-fast", 0.0, 1000)]);
        let policy = EffectivenessPolicy {
            cost_weight: 1.0,
            speed_weight: 0.0,
            ..Default::default()
        };

        let summary = summarize(&results, &run, &policy);
        assert_eq!(
            summary.per_model["free-slow"].efficiency_score,
            summary.per_model["free-fast"].efficiency_score
        );
        // Tie: first in iteration order.
        assert_eq!(summary.most_effective_model.as_deref(), Some("free-fast"));
    }

    #[test]
    fn test_paid_blend() {
        let results = result_set(&[("cheap", Some(80.0)), ("pricey", Some(90.0))]);
        let run = stats(&[("cheap", 0.01, 2000), ("pricey", 0.04, 1000)]);

        let summary = summarize(&results, &run, &EffectivenessPolicy::default());
        // cheap:  80 * (0.25 * 1.0  + 0.75 * 0.5) = 50.0
        // pricey: 90 * (0.25 * 0.25 + 0.75 * 1.0) = 73.125
        assert!((summary.per_model["cheap"].efficiency_score - 50.0).abs() < 1e-9);
        assert!((summary.per_model["pricey"].efficiency_score - 73.125).abs() < 1e-9);
        assert_eq!(summary.most_effective_model.as_deref(), Some("pricey"));
        assert_eq!(summary.cheapest_good_model.as_deref(), Some("cheap"));
    }

    #[test]
    fn test_policy_validation() {
        assert!(EffectivenessPolicy::default().validate().is_ok());
        let zero = EffectivenessPolicy {
            cost_weight: 0.0,
            speed_weight: 0.0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        let negative = EffectivenessPolicy {
            speed_weight: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }
}
