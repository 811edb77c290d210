use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use truthlayer_core::{load_claim_labels, load_queries, Claim, EvidencePassage, RunSummary};
use truthlayer_runtime::run::ArtifactWriter;
use truthlayer_runtime::{summarize, InMemoryCorpus, Pipeline, RunContext, RuntimeConfig};

#[derive(Parser)]
#[command(name = "truthlayer", about = "Evaluate grounded answers claim by claim")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate queries against models and write a run directory
    Run {
        /// Pipeline configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Queries (JSONL, JSON array or YAML)
        #[arg(short, long)]
        queries: PathBuf,

        /// Model ids to evaluate; defaults to every configured model
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Local corpus (JSONL or JSON array) searched instead of the
        /// configured backend
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Per-claim expected labels
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Override `output.runs_dir`
        #[arg(long)]
        runs_dir: Option<PathBuf>,
    },

    /// Recompute the summary tables of a run from its verdicts
    Summarize {
        /// Run directory
        run_dir: PathBuf,

        /// Configuration supplying aggregation settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Verify one claim against evidence passages
    Verify {
        /// The claim to check
        #[arg(long)]
        claim: String,

        /// Evidence passage text; repeat for several passages
        #[arg(short, long, required = true)]
        evidence: Vec<String>,

        /// Configuration selecting the entailment backend
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            queries,
            models,
            corpus,
            labels,
            runs_dir,
        } => {
            run(
                &config,
                &queries,
                models,
                corpus.as_deref(),
                labels.as_deref(),
                runs_dir,
            )
            .await
        }
        Commands::Summarize { run_dir, config } => summarize_run(&run_dir, config.as_deref()),
        Commands::Verify {
            claim,
            evidence,
            config,
        } => verify(&claim, &evidence, config.as_deref()).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

async fn run(
    config_path: &Path,
    queries_path: &Path,
    models: Vec<String>,
    corpus: Option<&Path>,
    labels: Option<&Path>,
    runs_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(Some(config_path))?;
    let queries = load_queries(queries_path)
        .with_context(|| format!("loading queries {}", queries_path.display()))?;
    let runs_dir = runs_dir.unwrap_or_else(|| config.output.runs_dir.clone());

    let mut builder = Pipeline::builder(config);
    if let Some(path) = corpus {
        let corpus = InMemoryCorpus::load(path)
            .with_context(|| format!("loading corpus {}", path.display()))?;
        tracing::info!(documents = corpus.len(), "Corpus loaded");
        builder = builder.search_backend(Arc::new(corpus));
    }
    if let Some(path) = labels {
        let labels = load_claim_labels(path)
            .with_context(|| format!("loading labels {}", path.display()))?;
        builder = builder.claim_labels(labels);
    }
    let pipeline = builder.build()?;

    let models = if models.is_empty() {
        pipeline.model_ids()
    } else {
        models
    };
    if models.is_empty() {
        bail!("no models to evaluate: add entries under `models` or pass --models");
    }

    let run = RunContext::create(&runs_dir)?;
    let cancel = run.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with partial results");
            cancel.cancel();
        }
    });

    let summary = pipeline.evaluate_run(&run, &queries, &models).await?;
    print_summary(&summary)?;
    println!("Run written to {}", run.dir().display());
    Ok(())
}

fn summarize_run(run_dir: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let summary = summarize(run_dir, config.aggregation)
        .with_context(|| format!("summarizing {}", run_dir.display()))?;
    ArtifactWriter::new(run_dir).write_summary(&summary)?;
    print_summary(&summary)
}

async fn verify(claim: &str, evidence: &[String], config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let pipeline = Pipeline::builder(config)
        .search_backend(Arc::new(InMemoryCorpus::new()))
        .build()?;

    let claim = Claim::new("cli", 0, claim);
    let passages: Vec<EvidencePassage> = evidence
        .iter()
        .enumerate()
        .map(|(i, text)| EvidencePassage::new(format!("e{}", i + 1), text.as_str(), 1.0))
        .collect();
    let verdict = pipeline.verify(&claim, &passages).await?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&summary.per_model)?);
    let coverage = &summary.coverage;
    println!(
        "Evaluated {}/{} items, {} verdicts counted, {} gaps",
        coverage.items_evaluated,
        coverage.items_total,
        coverage.verdicts_counted,
        coverage.gaps.len()
    );
    Ok(())
}
