//! Answer generation: ask every candidate model the same RAG question.

use crate::llm::{ChatProvider, Prompts};
use crate::model::{EvaluationRequest, ModelResponse, TokenUsage};
use crate::validation::prompt::format_context;
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A candidate model that did not produce an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub model_id: String,
    pub error: String,
}

/// Answers plus per-model failures, both in candidate order.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub responses: Vec<ModelResponse>,
    pub failures: Vec<GenerationFailure>,
}

/// Render the user prompt sent to candidate models.
pub fn build_answer_prompt(request: &EvaluationRequest) -> String {
    let context = format_context(&request.context_documents);
    Prompts::render(
        Prompts::answer_with_context(),
        &[("context", &context), ("query", &request.query)],
    )
}

/// Queries candidate models concurrently.
pub struct AnswerGenerator {
    provider: Arc<dyn ChatProvider>,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    async fn generate_one(&self, model_id: &str, prompt: &str) -> Result<ModelResponse, String> {
        let start = Instant::now();
        let call = self
            .provider
            .complete(model_id, Some(Prompts::system_rag_assistant()), prompt);
        let response = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result.map_err(|e| e.to_string())?,
            Err(_) => return Err("provider call panicked".to_string()),
        };
        let elapsed = start.elapsed().as_millis() as u64;

        if response.content.trim().is_empty() {
            return Err("empty answer".to_string());
        }

        let usage = response
            .usage
            .unwrap_or_else(|| TokenUsage::estimate(prompt, &response.content));

        Ok(ModelResponse::new(model_id, response.content)
            .with_usage(usage)
            .with_response_time(elapsed))
    }

    /// Ask every model in `models`. Duplicate ids are queried once.
    pub async fn generate(&self, request: &EvaluationRequest, models: &[String]) -> GenerationOutcome {
        let mut unique: Vec<&String> = Vec::with_capacity(models.len());
        for model in models {
            if !unique.contains(&model) {
                unique.push(model);
            }
        }
        if unique.is_empty() {
            return GenerationOutcome::default();
        }

        let prompt = build_answer_prompt(request);
        info!(models = unique.len(), "generating candidate answers");

        // `buffered` keeps candidate order while still polling every call at once.
        let results: Vec<(String, Result<ModelResponse, String>)> = stream::iter(unique)
            .map(|model| {
                let prompt = &prompt;
                async move { (model.clone(), self.generate_one(model, prompt).await) }
            })
            .buffered(models.len())
            .collect()
            .await;

        let mut outcome = GenerationOutcome::default();
        for (model_id, result) in results {
            match result {
                Ok(response) => {
                    info!(
                        model = %model_id,
                        elapsed_ms = response.response_time_ms,
                        tokens = response.token_usage.map(|u| u.total()).unwrap_or(0),
                        "answer received"
                    );
                    outcome.responses.push(response);
                }
                Err(error) => {
                    warn!(model = %model_id, error = %error, "answer generation failed");
                    outcome.failures.push(GenerationFailure { model_id, error });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, ValidatorError};
    use crate::llm::{LlmResponse, Message};
    use crate::model::ContextDocument;
    use crate::scoring::{CostTable, run_stats};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Candidates {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatProvider for Candidates {
        async fn send(&self, model: &str, messages: Vec<Message>) -> Result<LlmResponse> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages.last().map(|m| m.content.clone()).unwrap_or_default());
            match model {
                "broken" => Err(ValidatorError::LlmApi("model not found".to_string())),
                "panicky" => panic!("provider bug"),
                "silent" => Ok(LlmResponse::text("  ")),
                "metered" => Ok(LlmResponse {
                    content: "Paris".to_string(),
                    finish_reason: Some("stop".to_string()),
                    usage: Some(TokenUsage::reported(120, 3)),
                }),
                _ => Ok(LlmResponse::text("Paris is the capital of France.")),
            }
        }
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest::new(
            "What is the capital of France?",
            vec![ContextDocument::new("geo.txt", "Paris is the capital of France.")],
            vec![],
        )
    }

    #[test]
    fn test_answer_prompt_contains_context_and_query() {
        let prompt = build_answer_prompt(&request());
        assert!(prompt.contains("Source: geo.txt"));
        assert!(prompt.contains("Question: What is the capital of France?"));
        assert!(!prompt.contains("{context}"));
    }

    #[tokio::test]
    async fn test_generate_collects_answers_and_failures() {
        let provider = Arc::new(Candidates {
            prompts: Mutex::new(Vec::new()),
        });
        let generator = AnswerGenerator::new(provider.clone());
        let models: Vec<String> = ["metered", "broken", "plain", "silent", "plain"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let outcome = generator.generate(&request(), &models).await;

        let ids: Vec<&str> = outcome.responses.iter().map(|r| r.model_id.as_str()).collect();
        assert_eq!(ids, vec!["metered", "plain"]);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].model_id, "broken");
        assert!(outcome.failures[0].error.contains("model not found"));
        assert_eq!(outcome.failures[1].model_id, "silent");

        let metered = outcome.responses[0].token_usage.unwrap();
        assert_eq!(metered, TokenUsage::reported(120, 3));
        assert!(outcome.responses[1].token_usage.unwrap().estimated);

        assert_eq!(provider.prompts.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_panicking_provider_fails_only_that_model() {
        let generator = AnswerGenerator::new(Arc::new(Candidates {
            prompts: Mutex::new(Vec::new()),
        }));
        let models = vec!["panicky".to_string(), "plain".to_string()];

        let outcome = generator.generate(&request(), &models).await;

        assert_eq!(outcome.responses.len(), 1);
        assert_eq!(outcome.responses[0].model_id, "plain");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].model_id, "panicky");
        assert!(outcome.failures[0].error.contains("panicked"));
    }

    #[tokio::test]
    async fn test_imported_answer_costs_the_same_as_generated_one() {
        let context = "Paris is the capital of France. ".repeat(500);
        let request = EvaluationRequest::new(
            "What is the capital of France?",
            vec![ContextDocument::new("geo.txt", context)],
            vec![],
        );
        let generator = AnswerGenerator::new(Arc::new(Candidates {
            prompts: Mutex::new(Vec::new()),
        }));
        let generated = generator
            .generate(&request, &["gpt-4o".to_string()])
            .await
            .responses;
        let imported = vec![ModelResponse::new("gpt-4o", generated[0].answer_text.clone())];

        let costs = CostTable::with_builtin_prices();
        let generated_cost = run_stats(&request, &generated, &costs)["gpt-4o"].cost;
        let imported_cost = run_stats(&request, &imported, &costs)["gpt-4o"].cost;

        assert!(generated_cost > 0.01);
        assert_eq!(imported_cost, generated_cost);
    }

    #[tokio::test]
    async fn test_generate_without_models() {
        let generator = AnswerGenerator::new(Arc::new(Candidates {
            prompts: Mutex::new(Vec::new()),
        }));
        let outcome = generator.generate(&request(), &[]).await;
        assert!(outcome.responses.is_empty());
        assert!(outcome.failures.is_empty());
    }
}
