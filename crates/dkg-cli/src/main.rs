//! DKG CLI - Command-line interface
//!
//! Usage:
//!   dkg extract <input> [--output graph.json]
//!   dkg stats <graph.json>
//!   dkg prune <graph.json> --min-subject 2 --output pruned.json
//!   dkg canonicalize <surface>...
//!   dkg evaluate <input> --gold gold.json

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dkg_core::{AppConfig, CorefModel, DocumentSource, LoggingConfig, NlpBackend, SentenceParser};
use dkg_extractor::{AggregateMetrics, Canonicalizer, Evaluator, GoldTriple};
use dkg_graph::{fold_subject_extensions, prune_infrequent, KnowledgeGraph};
use dkg_nlp::{AnnotatedCorpus, DirectorySource, HttpNlpClient};
use dkg_pipeline::Pipeline;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "dkg")]
#[command(about = "Build a knowledge graph from a text corpus")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); DKG_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Http,
    Annotated,
}

impl From<Backend> for NlpBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Http => NlpBackend::Http,
            Backend::Annotated => NlpBackend::Annotated,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a knowledge graph from a corpus
    Extract {
        /// Corpus directory, or annotation file/directory for the annotated backend
        input: PathBuf,

        /// Where to write the graph JSON
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,

        /// NLP backend, overriding the configuration
        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// NLP service URL, overriding the configuration
        #[arg(long)]
        nlp_url: Option<String>,

        /// Documents processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print summary statistics of a graph
    Stats {
        graph: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fold subject extensions and prune infrequent entities
    Prune {
        graph: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Minimum total evidence for a subject
        #[arg(long, default_value_t = 1)]
        min_subject: usize,

        /// Minimum total evidence for an object
        #[arg(long, default_value_t = 1)]
        min_object: usize,

        /// Fold `bayer healthcare` into `bayer` before pruning
        #[arg(long)]
        fold: bool,
    },
    /// Show the canonical key of each surface string
    Canonicalize {
        #[arg(required = true)]
        surfaces: Vec<String>,
    },
    /// Score extraction against gold triples
    Evaluate {
        /// Corpus directory, or annotation file/directory for the annotated backend
        input: PathBuf,

        /// JSON object mapping document id to gold triples
        #[arg(long)]
        gold: PathBuf,

        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// Ignore predicates when matching
        #[arg(long)]
        ignore_predicates: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_tracing(&config.logging);

    match cli.command {
        Commands::Extract {
            input,
            output,
            backend,
            nlp_url,
            concurrency,
        } => {
            if let Some(backend) = backend {
                config.nlp.backend = backend.into();
            }
            if let Some(url) = nlp_url {
                config.nlp.base_url = url;
            }
            if let Some(concurrency) = concurrency {
                config.pipeline.concurrency = concurrency;
            }
            config.validate()?;
            extract(&config, &input, &output).await?;
        }
        Commands::Stats { graph, json } => {
            let graph = KnowledgeGraph::load(&graph)
                .with_context(|| format!("failed to load {}", graph.display()))?;
            let stats = graph.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{stats}");
            }
        }
        Commands::Prune {
            graph,
            output,
            min_subject,
            min_object,
            fold,
        } => {
            let mut graph = KnowledgeGraph::load(&graph)
                .with_context(|| format!("failed to load {}", graph.display()))?;
            let before = graph.stats();

            if fold {
                graph = fold_subject_extensions(&graph);
            }
            graph = prune_infrequent(&graph, min_subject, min_object);
            graph.save(&output)?;

            println!(
                "Entities: {} -> {}, edges: {} -> {}",
                before.entities,
                graph.entity_count(),
                before.edges,
                graph.edge_count()
            );
        }
        Commands::Canonicalize { surfaces } => {
            let canonicalizer = Canonicalizer::from_config(&config.canonical)?;
            for surface in surfaces {
                println!("{surface}\t{}", canonicalizer.canonicalize(&surface));
            }
        }
        Commands::Evaluate {
            input,
            gold,
            backend,
            ignore_predicates,
        } => {
            if let Some(backend) = backend {
                config.nlp.backend = backend.into();
            }
            config.validate()?;
            evaluate(&config, &input, &gold, ignore_predicates).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Build the pipeline for the configured backend
fn build_pipeline(config: &AppConfig, input: &Path) -> anyhow::Result<Pipeline> {
    let pipeline = match config.nlp.backend {
        NlpBackend::Http => {
            let client = Arc::new(HttpNlpClient::from_config(&config.nlp)?);
            let source: Arc<dyn DocumentSource> = Arc::new(DirectorySource::new(input));
            let coref: Arc<dyn CorefModel> = client.clone();
            let parser: Arc<dyn SentenceParser> = client;
            Pipeline::new(config, source, coref, parser)?
        }
        NlpBackend::Annotated => {
            let corpus = Arc::new(
                AnnotatedCorpus::load(input)
                    .with_context(|| format!("failed to load annotations from {}", input.display()))?,
            );
            tracing::info!(documents = corpus.len(), "Loaded annotated corpus");
            // Annotations were recorded against the stored text
            Pipeline::new(config, corpus.clone(), corpus.clone(), corpus)?.without_cleanup()
        }
    };
    Ok(pipeline)
}

async fn extract(config: &AppConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, input)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing documents in flight");
            on_signal.cancel();
        }
    });

    let report = pipeline.run(cancel).await?;
    report
        .graph
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    for failure in &report.failures {
        eprintln!(
            "skipped {} at {}: {}",
            failure.document_id, failure.stage, failure.reason
        );
    }

    println!("{}", serde_json::to_string_pretty(&report.summary())?);
    println!("Graph written to {}", output.display());
    Ok(())
}

async fn evaluate(
    config: &AppConfig,
    input: &Path,
    gold: &Path,
    ignore_predicates: bool,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(gold)
        .with_context(|| format!("failed to read {}", gold.display()))?;
    let gold: BTreeMap<String, Vec<GoldTriple>> =
        serde_json::from_str(&content).context("gold file must map document ids to triples")?;

    let pipeline = build_pipeline(config, input)?;
    let canonicalizer = Canonicalizer::from_config(&config.canonical)?;
    let evaluator = Evaluator::new(&canonicalizer).with_predicate_matching(!ignore_predicates);

    let mut aggregate = AggregateMetrics::default();
    for (id, expected) in &gold {
        match pipeline.process(id.as_str().into()).await {
            Ok(batch) => {
                let metrics = evaluator.evaluate(&batch.triples, expected);
                tracing::debug!(
                    document = %id,
                    f1 = metrics.triples.f1_score(),
                    "Evaluated document"
                );
                aggregate.add(&metrics);
            }
            Err(failure) => {
                eprintln!("skipped {id} at {}: {}", failure.stage, failure.reason);
            }
        }
    }

    print!("{}", aggregate.report());
    Ok(())
}
