use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{Map, Value};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use llm_inference::chat;
use llm_inference::config::{load_raw, ModelConfig, QuantizationOptions, RuntimeSettings};
use llm_inference::hub::{self, HubClient};
use llm_inference::inference::{InferenceWrapper, LlamaCppBackend};

/// Load a pretrained model from a YAML configuration and generate text with it
#[derive(Parser)]
#[command(name = "llm-inference")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, global = true, default_value = "configs/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the configured model and tokenizer into the local cache
    Download {
        /// Cache directory (defaults to models.directory from the configuration)
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },

    /// Run the built-in test prompts through the model
    Test,

    /// Generate a continuation for a single prompt
    Generate {
        /// Prompt text
        prompt: String,

        /// Upper bound on total tokens (defaults to model.max_length)
        #[arg(long)]
        max_length: Option<usize>,
    },

    /// Interactive prompt loop
    Chat,

    /// Show the model configuration
    Config,
}

/// Main entry point
///
/// Any error that escapes a command is printed and the process exits with status 1.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("\n{} {:#}", "An error occurred:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let raw = load_raw(&cli.config)
        .with_context(|| format!("Failed to read configuration {}", cli.config.display()))?;
    let settings = RuntimeSettings::from_raw(&raw)?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = init_logging(&settings)?;
    info!("llm-inference starting up");
    info!("Configuration: {}", cli.config.display());

    let models_dir = settings.models.directory.clone();

    match cli.command {
        Commands::Download { models_dir: override_dir } => {
            download(&raw, override_dir.unwrap_or(models_dir)).await
        }
        Commands::Test => {
            let config = Arc::new(ModelConfig::from_source(&cli.config)?);
            tokio::task::spawn_blocking(move || run_test(config, models_dir)).await??;
            Ok(())
        }
        Commands::Generate { prompt, max_length } => {
            let config = Arc::new(ModelConfig::from_source(&cli.config)?);
            let response = tokio::task::spawn_blocking(move || {
                let backend = LlamaCppBackend::new(&config, models_dir);
                let mut llm = InferenceWrapper::new(config, backend);
                llm.generate(&prompt, max_length)
            })
            .await??;
            println!("{}", response);
            Ok(())
        }
        Commands::Chat => {
            let config = Arc::new(ModelConfig::from_source(&cli.config)?);
            tokio::task::spawn_blocking(move || {
                let backend = LlamaCppBackend::new(&config, models_dir);
                let mut llm = InferenceWrapper::new(config, backend);
                chat::chat_loop(&mut llm).map_err(|e| anyhow!(e))
            })
            .await??;
            Ok(())
        }
        Commands::Config => {
            let config = ModelConfig::from_source(&cli.config)?;
            chat::display_config(&config);
            Ok(())
        }
    }
}

fn init_logging(settings: &RuntimeSettings) -> Result<WorkerGuard> {
    let log_dir = &settings.logging.directory;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "llm-inference");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(settings.logging.level.to_lowercase())
        .with_context(|| format!("Invalid log level {}", settings.logging.level))?;

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_line_number(true)
        .with_file(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let full_log_path = std::fs::canonicalize(log_dir)?;
    info!("Log directory: {}", full_log_path.display());
    Ok(guard)
}

/// Downloads the model named in the configuration. Only `model.name` is
/// required here, so the rest of the model section may still be incomplete.
async fn download(raw: &Map<String, Value>, models_dir: PathBuf) -> Result<()> {
    let model = raw
        .get("model")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("Configuration has no `model` section"))?;
    let name = model
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Configuration has no `model.name`"))?;

    let quantization: BTreeMap<String, Value> = model
        .get("quantization")
        .and_then(Value::as_object)
        .map(|q| q.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let options = QuantizationOptions::from_map(&quantization);

    println!("\nDownloading model: {}", name.bold());
    println!("This may take a few minutes...");

    let client = HubClient::new();
    let report = hub::download_model(&client, name, &options, &models_dir).await?;

    println!("\n{}", "Model and tokenizer downloaded successfully!".green().bold());
    println!("Model name: {}", name);
    println!("Weights: {}", report.weights);
    if !report.skipped.is_empty() {
        println!("Already present: {}", report.skipped.join(", "));
    }
    println!("\nFiles cached in: {}", display_path(&report.model_dir));
    Ok(())
}

fn run_test(config: Arc<ModelConfig>, models_dir: PathBuf) -> Result<()> {
    let backend = LlamaCppBackend::new(&config, models_dir);
    let mut llm = InferenceWrapper::new(config, backend);

    let outcomes = chat::run_inference_test(&mut llm, &chat::TEST_PROMPTS);
    chat::display_summary_table(&outcomes);

    println!("\n{}", "Tests completed successfully!".green().bold());
    Ok(())
}

fn display_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
