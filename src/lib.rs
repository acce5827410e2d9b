//! RAG Validator - LLM-as-judge scoring and cost/quality ranking of RAG answers.
//!
//! Several candidate models answer the same question over the same context
//! documents. A judge model scores every answer against a set of named
//! criteria, and the scores are combined with each model's cost and latency
//! into a small set of headline picks.
//!
//! # Overview
//!
//! 1. Load context documents and build an [`EvaluationRequest`]
//! 2. Generate answers from each candidate model (or bring your own)
//! 3. Judge all answers concurrently; judge output is parsed leniently and
//!    per-model failures never abort the run
//! 4. Rank: most effective, highest scoring, cheapest good model
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_validator::{
//!     config::Config,
//!     document::load_context_documents,
//!     generation::AnswerGenerator,
//!     llm::ProviderRouter,
//!     model::{Criterion, EvaluationRequest},
//!     persistence::{EvaluationRun, save_run},
//!     scoring::{run_stats, summarize},
//!     validation::ResponseValidator,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let provider = Arc::new(ProviderRouter::from_config(&config));
//!     let documents = load_context_documents(&[Path::new("docs/")])?;
//!     let request = EvaluationRequest::new(
//!         "What is our refund window?",
//!         documents,
//!         Criterion::parse_list("Accuracy, Completeness"),
//!     );
//!
//!     let models = vec!["gpt-4o".to_string(), "ollama/llama3".to_string()];
//!     let answers = AnswerGenerator::new(provider.clone())
//!         .generate(&request, &models)
//!         .await;
//!
//!     let validator = ResponseValidator::new(provider, "gpt-4o");
//!     let results = validator
//!         .validate_responses(&request, &answers.responses, None)
//!         .await;
//!
//!     let stats = run_stats(&request, &answers.responses, &config.cost_table());
//!     let summary = summarize(&results, &stats, &config.effectiveness);
//!     println!("Most effective: {:?}", summary.most_effective_model);
//!
//!     let run = EvaluationRun::new("gpt-4o", request, answers.responses, results, stats, summary);
//!     save_run(&run, Path::new("run.json"))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **ChatProvider**: the seam to any OpenAI-compatible endpoint
//! - **ResponseValidator**: concurrent judge calls with progress events
//! - **parser**: direct, extracted and cleaned-up JSON parse stages
//! - **scoring**: cost tables and the effectiveness blend
//! - **analysis**: chunking and embedding statistics

pub mod analysis;
pub mod config;
pub mod document;
pub mod error;
pub mod generation;
pub mod llm;
pub mod model;
pub mod persistence;
pub mod report;
pub mod scoring;
pub mod settings;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, ValidatorError};
pub use generation::AnswerGenerator;
pub use llm::{ChatProvider, LlmClient, ProviderRouter};
pub use model::{ContextDocument, Criterion, EvaluationRequest, ModelResponse, TokenUsage};
pub use persistence::{EvaluationRun, load_run, save_run};
pub use scoring::{EffectivenessPolicy, EffectivenessSummary, summarize};
pub use settings::{JsonFileStore, SettingsStore, ValidatorSettings};
pub use validation::{ResponseValidator, ValidationResult, ValidationSet};
