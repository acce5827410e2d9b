//! Concurrent judge calls, one per candidate answer.
//!
//! All calls for a run are started together on the current task and polled
//! concurrently. A failing call (transport error, API error, even a panic in
//! the provider) becomes a failed [`ValidationResult`] for that model only,
//! so the returned set always has exactly one entry per input model.

use crate::llm::{ChatProvider, Prompts};
use crate::model::{EvaluationRequest, ModelResponse};
use crate::settings::ValidatorSettings;
use crate::validation::parser::parse_judge_response;
use crate::validation::prompt::build_evaluation_prompt;
use crate::validation::types::{ProgressPhase, ValidationProgress, ValidationResult, ValidationSet};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Progress callback. Called once when a model's judge call starts and once
/// when it completes.
pub type ProgressFn<'a> = &'a (dyn Fn(&ValidationProgress) + Send + Sync);

/// Scores candidate answers with a single judge model.
#[derive(Clone)]
pub struct ResponseValidator {
    provider: Arc<dyn ChatProvider>,
    judge_model: String,
}

impl ResponseValidator {
    /// Create a validator that sends every judge call to `judge_model`.
    pub fn new(provider: Arc<dyn ChatProvider>, judge_model: impl Into<String>) -> Self {
        Self {
            provider,
            judge_model: judge_model.into(),
        }
    }

    /// Create from persisted settings.
    pub fn from_settings(provider: Arc<dyn ChatProvider>, settings: &ValidatorSettings) -> Self {
        Self::new(provider, settings.judge_model.clone())
    }

    pub fn judge_model(&self) -> &str {
        &self.judge_model
    }

    /// Judge a single answer. Errors are folded into a failed result.
    pub async fn validate_one(
        &self,
        request: &EvaluationRequest,
        model_id: &str,
        answer: &str,
    ) -> ValidationResult {
        let prompt = build_evaluation_prompt(request, answer);
        let start = Instant::now();

        let call = self
            .provider
            .complete(&self.judge_model, Some(Prompts::system_judge()), &prompt);

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(response)) => {
                debug!(
                    model = model_id,
                    judge = %self.judge_model,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "judge call completed"
                );
                parse_judge_response(model_id, &response.content, request)
            }
            Ok(Err(e)) => {
                warn!(model = model_id, judge = %self.judge_model, error = %e, "judge call failed");
                ValidationResult::failed(model_id, e.to_string(), "")
            }
            Err(_) => {
                warn!(model = model_id, judge = %self.judge_model, "judge call panicked");
                ValidationResult::failed(model_id, "Judge call panicked", "")
            }
        }
    }

    /// Judge every answer concurrently.
    ///
    /// `answers` maps model id to answer text. The returned set has exactly
    /// the same keys. Completion events arrive in network completion order;
    /// each model's start event precedes its completion event and the
    /// `completed` counter only grows.
    pub async fn validate(
        &self,
        request: &EvaluationRequest,
        answers: &BTreeMap<String, String>,
        progress: Option<ProgressFn<'_>>,
    ) -> ValidationSet {
        let total = answers.len();
        if total == 0 {
            return ValidationSet::new();
        }

        info!(models = total, judge = %self.judge_model, "starting validation run");

        let completed = AtomicUsize::new(0);
        let notify = |model_id: &str, phase: ProgressPhase, done: usize| {
            if let Some(callback) = progress {
                callback(&ValidationProgress {
                    model_id: model_id.to_string(),
                    phase,
                    completed: done,
                    total,
                });
            }
        };

        let tasks = answers.iter().map(|(model_id, answer)| {
            let completed = &completed;
            let notify = &notify;
            async move {
                notify(model_id, ProgressPhase::Started, completed.load(Ordering::SeqCst));
                let result = self.validate_one(request, model_id, answer).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                notify(
                    model_id,
                    ProgressPhase::Completed {
                        failed: result.is_error(),
                    },
                    done,
                );
                (model_id.clone(), result)
            }
        });

        let results: ValidationSet = stream::iter(tasks)
            .buffer_unordered(total)
            .collect()
            .await;

        let failures = results.values().filter(|r| r.is_error()).count();
        info!(models = total, failures, "validation run finished");

        results
    }

    /// Judge a batch of [`ModelResponse`]s.
    ///
    /// Responses sharing a model id collapse to the last one.
    pub async fn validate_responses(
        &self,
        request: &EvaluationRequest,
        responses: &[ModelResponse],
        progress: Option<ProgressFn<'_>>,
    ) -> ValidationSet {
        let mut answers = BTreeMap::new();
        for response in responses {
            if answers
                .insert(response.model_id.clone(), response.answer_text.clone())
                .is_some()
            {
                warn!(model = %response.model_id, "duplicate model id; keeping the last answer");
            }
        }
        self.validate(request, &answers, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, ValidatorError};
    use crate::llm::{LlmResponse, Message};
    use crate::model::Criterion;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const GOOD: &str = r#"{"criteria":{"Accuracy":{"score":95,"explanation":"correct"},"Clarity":{"score":90,"explanation":"clear"}},"overall":{"score":92,"explanation":"good"}}"#;

    /// Judge whose behaviour depends on the answer text embedded in the prompt.
    struct ScriptedJudge {
        delays_ms: BTreeMap<&'static str, u64>,
        seen_models: Mutex<Vec<String>>,
    }

    impl ScriptedJudge {
        fn new() -> Self {
            Self {
                delays_ms: BTreeMap::new(),
                seen_models: Mutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, marker: &'static str, millis: u64) -> Self {
            self.delays_ms.insert(marker, millis);
            self
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedJudge {
        async fn send(&self, model: &str, messages: Vec<Message>) -> Result<LlmResponse> {
            self.seen_models.lock().unwrap().push(model.to_string());
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();

            for (marker, millis) in &self.delays_ms {
                if prompt.contains(marker) {
                    tokio::time::sleep(Duration::from_millis(*millis)).await;
                }
            }

            if prompt.contains("NETWORK-FAIL") {
                return Err(ValidatorError::Http("connection reset".to_string()));
            }
            if prompt.contains("PANIC") {
                panic!("provider bug");
            }
            if prompt.contains("GARBAGE") {
                return Ok(LlmResponse::text("I refuse to answer in JSON."));
            }
            Ok(LlmResponse::text(GOOD))
        }
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest::new(
            "What is the capital of France?",
            vec![],
            Criterion::parse_list("Accuracy, Clarity"),
        )
    }

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(m, a)| (m.to_string(), a.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_scenario_single_model() {
        let judge = Arc::new(ScriptedJudge::new());
        let validator = ResponseValidator::new(judge.clone(), "judge-model");

        let results = validator
            .validate(&request(), &answers(&[("gpt-4o", "Paris is the capital.")]), None)
            .await;

        let result = &results["gpt-4o"];
        assert_eq!(result.overall_score(), Some(92.0));
        assert!(result.criterion("Accuracy").is_some());
        assert!(result.criterion("Clarity").is_some());
        assert_eq!(*judge.seen_models.lock().unwrap(), vec!["judge-model"]);
    }

    #[tokio::test]
    async fn test_failures_stay_per_model() {
        let validator = ResponseValidator::new(Arc::new(ScriptedJudge::new()), "judge");
        let input = answers(&[
            ("claude-x", "NETWORK-FAIL"),
            ("gpt-4o", "Paris."),
            ("llama3", "GARBAGE"),
            ("mistral", "PANIC"),
        ]);

        let results = validator.validate(&request(), &input, None).await;

        assert_eq!(
            results.keys().collect::<Vec<_>>(),
            input.keys().collect::<Vec<_>>()
        );
        assert!(results["claude-x"].error().unwrap().contains("connection reset"));
        assert!(results["llama3"].is_error());
        assert!(results["mistral"].is_error());
        assert_eq!(results["gpt-4o"].overall_score(), Some(92.0));
    }

    #[tokio::test]
    async fn test_progress_events_ordering() {
        let judge = ScriptedJudge::new()
            .with_delay("slow", 60)
            .with_delay("fast", 5);
        let validator = ResponseValidator::new(Arc::new(judge), "judge");
        let events: Mutex<Vec<ValidationProgress>> = Mutex::new(Vec::new());
        let record = |event: &ValidationProgress| events.lock().unwrap().push(event.clone());
        let callback: ProgressFn = &record;

        let input = answers(&[("a-slow", "slow"), ("b-fast", "fast"), ("c-fail", "NETWORK-FAIL")]);
        let results = validator.validate(&request(), &input, Some(callback)).await;
        assert_eq!(results.len(), 3);

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 6);

        for model in input.keys() {
            let phases: Vec<_> = events
                .iter()
                .filter(|e| &e.model_id == model)
                .map(|e| e.phase)
                .collect();
            assert_eq!(phases.len(), 2);
            assert_eq!(phases[0], ProgressPhase::Started);
            assert!(matches!(phases[1], ProgressPhase::Completed { .. }));
        }

        let completions: Vec<&ValidationProgress> = events
            .iter()
            .filter(|e| matches!(e.phase, ProgressPhase::Completed { .. }))
            .collect();
        let counts: Vec<usize> = completions.iter().map(|e| e.completed).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert!(completions.iter().all(|e| e.total == 3));

        // Network completion order, not input order.
        assert_eq!(completions.last().unwrap().model_id, "a-slow");
        let failed = completions.iter().find(|e| e.model_id == "c-fail").unwrap();
        assert_eq!(failed.phase, ProgressPhase::Completed { failed: true });
    }

    #[tokio::test]
    async fn test_calls_run_concurrently() {
        let judge = ScriptedJudge::new().with_delay("wait", 100);
        let validator = ResponseValidator::new(Arc::new(judge), "judge");
        let input = answers(&[("a", "wait"), ("b", "wait"), ("c", "wait"), ("d", "wait")]);

        let start = Instant::now();
        let results = validator.validate(&request(), &input, None).await;
        assert_eq!(results.len(), 4);
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[test]
    fn test_empty_input_yields_empty_set() {
        let validator = ResponseValidator::new(Arc::new(ScriptedJudge::new()), "judge");
        let results = tokio_test::block_on(validator.validate(&request(), &BTreeMap::new(), None));
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_validate_responses_dedupes_ids() {
        let validator = ResponseValidator::from_settings(
            Arc::new(ScriptedJudge::new()),
            &ValidatorSettings::default(),
        );
        assert_eq!(validator.judge_model(), "gpt-4o");

        let responses = vec![
            ModelResponse::new("m1", "NETWORK-FAIL"),
            ModelResponse::new("m2", "Paris."),
            ModelResponse::new("m1", "Paris."),
        ];
        let results = validator.validate_responses(&request(), &responses, None).await;
        assert_eq!(results.len(), 2);
        assert!(!results["m1"].is_error());
    }
}
