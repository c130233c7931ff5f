use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use support_triage::classify::{BackendKind, TrainingOptions, trained};
use support_triage::config::PipelineConfig;
use support_triage::dataset::Dataset;
use support_triage::draft::CONFIDENCE_THRESHOLD;
use support_triage::error::{DatasetError, Error};
use support_triage::eval;
use support_triage::pipeline::{InboundMessage, MessageProcessor, ProcessedMessage};
use support_triage::redact::{Redactor, load_patterns};

const RULE: &str = "────────────────────────────────────────────────────────────────────────";

#[derive(Parser)]
#[command(name = "support-triage")]
#[command(about = "Redact, classify and draft replies for banking support messages")]
#[command(version)]
struct Cli {
    /// Directory holding messages.csv, pii_patterns.yaml and kb/
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Persisted model artifact
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Classifier backend: lookup (stub) or trained (mtl). Default: auto
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Enable generated drafts (needs an API key)
    #[arg(long, global = true)]
    use_llm: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one message, or the first rows of the dataset
    Run {
        /// Single message to process instead of the dataset
        #[arg(env = "MSG")]
        message: Option<String>,

        /// Dataset rows to process
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Print the redacted form of TEXT
    Redact { text: String },
    /// Classify TEXT with the selected backend
    Classify {
        text: String,

        /// Dataset id for the lookup backend
        #[arg(long)]
        message_id: Option<String>,
    },
    /// Train the classifier and persist it
    Train {
        /// Fraction of rows to train on, in (0, 1]
        #[arg(long, default_value_t = 1.0)]
        train_ratio: f64,
    },
    /// Report classification accuracy and draft check counts
    Eval {
        /// Dataset rows used for draft checks
        #[arg(short, long, default_value_t = 30)]
        limit: usize,

        /// Also print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let command = cli.command.unwrap_or(Command::Run {
        message: std::env::var("MSG").ok(),
        limit: 5,
    });

    match command {
        Command::Run { message, limit } => {
            let message = message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
            run(&config, message, limit).await
        }
        Command::Redact { text } => {
            let redactor = Redactor::new(&load_patterns(&config.patterns_path));
            println!("{}", redactor.redact(&text));
            Ok(())
        }
        Command::Classify { text, message_id } => {
            let processor = MessageProcessor::from_config(&config);
            let redacted = processor.redactor().redact(&text);
            let result = processor
                .classifier()
                .classify(&redacted, message_id.as_deref(), processor.backend())
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Train { train_ratio } => train(&config, train_ratio),
        Command::Eval { limit, json } => evaluate(&config, limit, json).await,
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Invalid environment configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.set_data_dir(dir);
    }
    if let Some(path) = &cli.model_path {
        config.model_path = path.clone();
    }
    if let Some(name) = &cli.backend {
        config.backend = Some(BackendKind::from_name_or_lookup(name));
    }
    if cli.use_llm {
        config.generation.enabled = true;
    }
    Ok(config)
}

async fn run(config: &PipelineConfig, message: Option<String>, limit: usize) -> anyhow::Result<()> {
    let processor = MessageProcessor::from_config(config);
    let mode = if processor.generation_available() {
        format!("generated ({})", config.generation.model)
    } else {
        "template".to_string()
    };
    println!("Backend: {}. Draft: {mode}.", processor.backend());
    println!("Data directory: {}\n", config.data_dir.display());

    if let Some(text) = message {
        let preview: String = text.chars().take(120).collect();
        let ellipsis = if text.chars().count() > 120 { "..." } else { "" };
        println!("  input: {preview}{ellipsis}\n");

        let result = processor.process(InboundMessage::ad_hoc(text)).await;
        print_summary(&result, config);
        println!("  draft: {}", result.draft.text);
        return Ok(());
    }

    let dataset = match Dataset::load(&config.messages_path) {
        Ok(dataset) => dataset,
        Err(DatasetError::NotFound(path)) => {
            println!("messages.csv not found at {}", path.display());
            return Ok(());
        }
        Err(e) => {
            println!("Cannot read {}: {e}", config.messages_path.display());
            return Ok(());
        }
    };

    let messages: Vec<InboundMessage> = dataset
        .records()
        .iter()
        .take(limit)
        .map(InboundMessage::from)
        .collect();
    println!("Processed {} messages\n", messages.len());

    for result in processor.process_batch(messages).await {
        print_summary(&result, config);
        println!("    draft: {}", result.draft_preview());
        println!("{RULE}");
    }
    Ok(())
}

fn print_summary(result: &ProcessedMessage, config: &PipelineConfig) {
    let c = &result.classification;
    println!(
        "  {} intent={} queue={} confidence={:.2} fallback={} checks={}",
        result.message_id.as_deref().unwrap_or("-"),
        c.intent,
        c.suggested_queue,
        c.confidence,
        result.draft.used_fallback,
        result.status.label()
    );
    if config.generation.enabled && c.confidence < CONFIDENCE_THRESHOLD {
        println!("  (LLM skipped: confidence < {CONFIDENCE_THRESHOLD})");
    }
}

fn train(config: &PipelineConfig, train_ratio: f64) -> anyhow::Result<()> {
    if !config.messages_path.is_file() {
        println!("messages.csv not found at {}", config.messages_path.display());
        return Ok(());
    }
    let options = TrainingOptions {
        train_ratio,
        ..TrainingOptions::default()
    };
    trained::train_and_save(&config.messages_path, &config.model_path, &options)
        .with_context(|| format!("Training failed on {}", config.messages_path.display()))?;
    println!("Model saved to {}", config.model_path.display());
    Ok(())
}

async fn evaluate(config: &PipelineConfig, limit: usize, json: bool) -> anyhow::Result<()> {
    let report = match eval::evaluate(config, limit).await {
        Ok(report) => report,
        Err(Error::Dataset(e)) => {
            println!("Evaluation skipped: {e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Evaluation");
    println!("==========");
    let m = &report.classification;
    println!(
        "Classification: backend={} accuracy={:.3} correct={} total={}",
        m.backend, m.accuracy, m.correct, m.total
    );
    let d = &report.draft_checks;
    println!(
        "Draft checks (sample): passed={} failed={} total={}",
        d.passed, d.failed, d.total
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
