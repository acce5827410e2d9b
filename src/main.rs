//! RAG Validator CLI
//!
//! Generate answers from several models, score them with a judge model, and
//! rank them by quality, cost and speed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_validator::{
    analysis::{
        AnalysisOptions, ChunkConfig, ChunkStats, EmbeddingAnalyzer, chunk_documents,
    },
    config::Config,
    document::{load_answers, load_context_documents},
    generation::{AnswerGenerator, GenerationFailure},
    llm::{LlmClient, ProviderRouter},
    model::{ContextDocument, Criterion, EvaluationRequest, ModelResponse},
    persistence::{DEFAULT_RUN_PATH, EvaluationRun, load_run, run_exists, run_size, save_run},
    report::{self, OutputFormat},
    scoring::{run_stats, summarize},
    settings::{JsonFileStore, ValidatorSettings},
    validation::{ProgressFn, ProgressPhase, ResponseValidator, ValidationProgress},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// RAG Validator - score RAG answers with an LLM judge and rank models
#[derive(Parser)]
#[command(name = "rag-validator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate answers from candidate models, judge them, and save the run
    Run {
        /// The question to ask every model
        query: String,

        /// Candidate model ids (comma-separated; prefix with an endpoint name to route)
        #[arg(short, long, value_delimiter = ',', required = true)]
        models: Vec<String>,

        /// Context document files or directories
        #[arg(short, long)]
        docs: Vec<PathBuf>,

        /// Evaluation criteria (overrides saved settings)
        #[arg(long)]
        criteria: Option<String>,

        /// Judge model (overrides JUDGE_MODEL and saved settings)
        #[arg(long)]
        judge: Option<String>,

        /// Output path for the saved run (.json or .bin)
        #[arg(short, long, default_value = DEFAULT_RUN_PATH)]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,

        /// Show per-criterion explanations
        #[arg(short, long)]
        verbose: bool,
    },

    /// Judge pre-generated answers from a JSON file
    Validate {
        /// Answers file: {"query": .., "answers": {model: answer}}
        answers: PathBuf,

        /// Question (required when the answers file has none)
        #[arg(short, long)]
        query: Option<String>,

        /// Context document files or directories
        #[arg(short, long)]
        docs: Vec<PathBuf>,

        #[arg(long)]
        criteria: Option<String>,

        /// Judge model (overrides JUDGE_MODEL and saved settings)
        #[arg(long)]
        judge: Option<String>,

        /// Save the run to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Display a saved run
    Show {
        /// Path to the saved run
        #[arg(default_value = DEFAULT_RUN_PATH)]
        run: PathBuf,

        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Chunk context documents and print chunk statistics
    Chunk {
        /// Document files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long, default_value_t = 512)]
        chunk_size: usize,

        #[arg(long, default_value_t = 50)]
        chunk_overlap: usize,

        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,
    },

    /// Embed document chunks and print embedding statistics
    Analyze {
        /// Document files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Embedding model served at /v1/embeddings
        #[arg(short = 'e', long, default_value = "text-embedding-3-small")]
        embedding_model: String,

        #[arg(long, default_value_t = 512)]
        chunk_size: usize,

        #[arg(long, default_value_t = 50)]
        chunk_overlap: usize,

        /// Power-method iterations for the principal direction
        #[arg(long, default_value_t = 1)]
        iterations: usize,

        /// Chunks sent per embeddings request
        #[arg(long, default_value_t = 32)]
        batch_size: usize,

        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,
    },

    /// Show or change saved validator settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Test LLM connection
    Test,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings
    Show,
    /// Save a judge model and/or criteria
    Set {
        /// Judge model to save (JUDGE_MODEL still wins when set)
        #[arg(long)]
        judge: Option<String>,
        #[arg(long)]
        criteria: Option<String>,
    },
    /// Remove saved settings
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rag_validator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            query,
            models,
            docs,
            criteria,
            judge,
            output,
            format,
            verbose,
        } => {
            cmd_run(
                config_path,
                query,
                models,
                docs,
                Overrides { criteria, judge },
                output,
                format,
                verbose,
            )
            .await
        }
        Commands::Validate {
            answers,
            query,
            docs,
            criteria,
            judge,
            output,
            format,
            verbose,
        } => {
            cmd_validate(
                config_path,
                answers,
                query,
                docs,
                Overrides { criteria, judge },
                output,
                format,
                verbose,
            )
            .await
        }
        Commands::Show {
            run,
            format,
            verbose,
        } => cmd_show(run, format, verbose),
        Commands::Chunk {
            paths,
            chunk_size,
            chunk_overlap,
            format,
        } => cmd_chunk(paths, chunk_size, chunk_overlap, format),
        Commands::Analyze {
            paths,
            embedding_model,
            chunk_size,
            chunk_overlap,
            iterations,
            batch_size,
            format,
        } => {
            cmd_analyze(
                config_path,
                paths,
                embedding_model,
                ChunkConfig {
                    chunk_size,
                    chunk_overlap,
                },
                iterations,
                batch_size,
                format,
            )
            .await
        }
        Commands::Settings { action } => cmd_settings(config_path, action),
        Commands::Test => cmd_test(config_path).await,
    }
}

/// Command-line overrides of the saved judge settings.
struct Overrides {
    criteria: Option<String>,
    judge: Option<String>,
}

fn settings_store() -> Result<JsonFileStore> {
    let path = JsonFileStore::default_path().context("Could not determine settings directory")?;
    Ok(JsonFileStore::new(path))
}

fn effective_settings(config: &Config, overrides: Overrides) -> Result<ValidatorSettings> {
    let store = settings_store()?;
    let mut settings = ValidatorSettings::load(&store, &config.validation)
        .context("Failed to load settings")?
        .with_env_overrides();
    if let Some(criteria) = overrides.criteria {
        settings.criteria = criteria;
    }
    if let Some(judge) = overrides.judge {
        settings.judge_model = judge;
    }
    Ok(settings)
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_documents(paths: &[PathBuf]) -> Result<Vec<ContextDocument>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    let documents = load_context_documents(paths).context("Failed to load context documents")?;
    let chars: usize = documents.iter().map(|d| d.text.chars().count()).sum();
    println!("  Context: {} documents ({} chars)", documents.len(), chars);
    Ok(documents)
}

fn print_progress(event: &ValidationProgress) {
    if let ProgressPhase::Completed { failed } = event.phase {
        let status = if failed { "failed" } else { "done" };
        eprintln!(
            "  [{}/{}] {} {}",
            event.completed, event.total, event.model_id, status
        );
    }
}

/// Judge, rank, optionally save, and print.
#[allow(clippy::too_many_arguments)]
async fn judge_and_report(
    config: &Config,
    provider: Arc<ProviderRouter>,
    settings: &ValidatorSettings,
    request: EvaluationRequest,
    responses: Vec<ModelResponse>,
    generation_failures: Vec<GenerationFailure>,
    output: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let validator = ResponseValidator::from_settings(provider, settings);
    println!(
        "\nJudging {} answers with {}...",
        responses.len(),
        validator.judge_model()
    );

    let start = Instant::now();
    let progress: ProgressFn = &print_progress;
    let results = validator
        .validate_responses(&request, &responses, Some(progress))
        .await;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "judging finished");

    let stats = run_stats(&request, &responses, &config.cost_table());
    let summary = summarize(&results, &stats, &config.effectiveness);

    let run = EvaluationRun::new(
        validator.judge_model(),
        request,
        responses,
        results,
        stats,
        summary,
    )
    .with_generation_failures(generation_failures);

    println!("{}", "─".repeat(60));
    report::print_run(&run, format, verbose);
    println!("{}", "─".repeat(60));

    if let Some(path) = output {
        save_run(&run, path).context("Failed to save evaluation run")?;
        let size = run_size(path)?;
        println!("Run saved to: {} ({:.1} KB)", path.display(), size as f64 / 1024.0);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    config_path: Option<&Path>,
    query: String,
    models: Vec<String>,
    docs: Vec<PathBuf>,
    overrides: Overrides,
    output: PathBuf,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    println!("Loading configuration...");
    let config = load_config(config_path)?;
    let settings = effective_settings(&config, overrides)?;

    let documents = load_documents(&docs)?;
    let request = EvaluationRequest::new(query, documents, Criterion::parse_list(&settings.criteria));

    let provider = Arc::new(ProviderRouter::from_config(&config));

    println!("Generating answers from {} models...", models.len());
    let start = Instant::now();
    let outcome = AnswerGenerator::new(provider.clone())
        .generate(&request, &models)
        .await;

    for response in &outcome.responses {
        println!(
            "  {}: {} chars in {} ms",
            response.model_id,
            response.answer_text.chars().count(),
            response.response_time_ms
        );
    }
    for failure in &outcome.failures {
        println!("  {}: FAILED ({})", failure.model_id, failure.error);
    }
    println!("Generation took {:.2?}", start.elapsed());

    if outcome.responses.is_empty() {
        anyhow::bail!("No model produced an answer; nothing to validate.");
    }

    judge_and_report(
        &config,
        provider,
        &settings,
        request,
        outcome.responses,
        outcome.failures,
        Some(&output),
        format,
        verbose,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn cmd_validate(
    config_path: Option<&Path>,
    answers_path: PathBuf,
    query: Option<String>,
    docs: Vec<PathBuf>,
    overrides: Overrides,
    output: Option<PathBuf>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    println!("Loading configuration...");
    let config = load_config(config_path)?;
    let settings = effective_settings(&config, overrides)?;

    let answers = load_answers(&answers_path).context("Failed to load answers file")?;
    let query = query
        .or(answers.query)
        .context("No query given. Pass --query or add \"query\" to the answers file.")?;

    let mut documents = answers.documents;
    documents.extend(load_documents(&docs)?);

    if answers.responses.is_empty() {
        anyhow::bail!("Answers file '{}' contains no answers.", answers_path.display());
    }

    let request = EvaluationRequest::new(query, documents, Criterion::parse_list(&settings.criteria));
    let provider = Arc::new(ProviderRouter::from_config(&config));

    judge_and_report(
        &config,
        provider,
        &settings,
        request,
        answers.responses,
        Vec::new(),
        output.as_deref(),
        format,
        verbose,
    )
    .await
}

fn cmd_show(run_path: PathBuf, format: OutputFormat, verbose: bool) -> Result<()> {
    if !run_exists(&run_path) {
        anyhow::bail!(
            "Run not found at '{}'. Run the 'run' or 'validate' command first.",
            run_path.display()
        );
    }

    let run = load_run(&run_path).context("Failed to load evaluation run")?;
    report::print_run(&run, format, verbose);

    Ok(())
}

fn cmd_chunk(
    paths: Vec<PathBuf>,
    chunk_size: usize,
    chunk_overlap: usize,
    format: OutputFormat,
) -> Result<()> {
    let config = ChunkConfig {
        chunk_size,
        chunk_overlap,
    };
    config.validate().context("Invalid chunk settings")?;

    let documents = load_context_documents(&paths).context("Failed to load documents")?;
    let chunks = chunk_documents(&documents, &config);
    let stats = ChunkStats::from_chunks(&chunks);

    match format {
        OutputFormat::Json => report::print_json(&stats),
        OutputFormat::Plain => {
            println!("Documents: {}", documents.len());
            print!("{}", report::render_chunk_stats(&stats));
        }
    }

    Ok(())
}

async fn cmd_analyze(
    config_path: Option<&Path>,
    paths: Vec<PathBuf>,
    embedding_model: String,
    chunking: ChunkConfig,
    iterations: usize,
    batch_size: usize,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(config_path)?;
    let documents = load_context_documents(&paths).context("Failed to load documents")?;

    let analyzer =
        EmbeddingAnalyzer::new(LlmClient::new(config.llm), embedding_model).with_batch_size(batch_size);
    let options = AnalysisOptions {
        power_iterations: iterations,
    };

    let start = Instant::now();
    let (chunk_stats, embedding_stats) = analyzer
        .analyze(&documents, &chunking, &options)
        .await
        .context("Embedding analysis failed")?;

    match format {
        OutputFormat::Json => report::print_json(&serde_json::json!({
            "chunks": chunk_stats,
            "embeddings": embedding_stats,
        })),
        OutputFormat::Plain => {
            print!("{}", report::render_chunk_stats(&chunk_stats));
            println!("{}", "─".repeat(60));
            print!("{}", report::render_embedding_stats(&embedding_stats));
            println!("{}", "─".repeat(60));
            println!("Analyzed in {:.2?}", start.elapsed());
        }
    }

    Ok(())
}

fn cmd_settings(config_path: Option<&Path>, action: SettingsAction) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let store = settings_store()?;

    match action {
        SettingsAction::Show => {}
        SettingsAction::Set { judge, criteria } => {
            let mut settings = ValidatorSettings::load(&store, &config.validation)?;
            if let Some(judge) = judge {
                settings.judge_model = judge;
            }
            if let Some(criteria) = criteria {
                settings.criteria = criteria;
            }
            settings.save(&store).context("Failed to save settings")?;
            println!("Settings saved.");
        }
        SettingsAction::Reset => {
            ValidatorSettings::clear(&store).context("Failed to reset settings")?;
            println!("Settings reset to defaults.");
        }
    }

    let settings = ValidatorSettings::load(&store, &config.validation)?.with_env_overrides();
    let criteria: Vec<String> = Criterion::parse_list(&settings.criteria)
        .into_iter()
        .map(|c| c.name)
        .collect();

    println!("Validator Settings");
    println!("{}", "─".repeat(40));
    println!("  Judge model:  {}", settings.judge_model);
    println!("  Criteria:     {}", criteria.join(", "));
    println!("  Stored in:    {}", store.path().display());

    Ok(())
}

async fn cmd_test(config_path: Option<&Path>) -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load(config_path).context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    let key_preview: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", key_preview);
    for (name, endpoint) in &config.endpoints {
        println!("  Endpoint:  {} -> {}", name, endpoint.api_base);
    }
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request to {}...", client.default_model());
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
