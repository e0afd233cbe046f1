//! pcat-ingest - product consolidation and classification batch tool
//!
//! **Commands:**
//! - `run`: collect, consolidate, classify and persist a list of identifiers
//! - `classify`: classify a single product without persisting anything to the store
//! - `refresh-taxonomy`: rebuild `taxonomy.toml` from the store
//! - `clear-cache`: empty the classification cache

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcat_common::config::{load_toml_config, resolve_root_folder, RootFolderInitializer, TomlConfig};
use pcat_common::events::{CatalogEvent, EventBus};
use pcat_common::human_time::format_progress_times;
use pcat_ingest::adapters::{JsonFileSource, SourcePlan, SourceRegistry};
use pcat_ingest::classification::{build_classifier, ClassificationCache, ClassificationPipeline, ClassifierKind};
use pcat_ingest::config::{BatchConfig, PipelineConfig};
use pcat_ingest::db::{init_database_pool, ProductStore};
use pcat_ingest::models::Taxonomy;
use pcat_ingest::services::{BatchOrchestrator, BatchReport, BatchRequest, IdentifierOutcome, WorkingSet};
use pcat_ingest::types::ProductDescriptor;

/// Command-line arguments for pcat-ingest
#[derive(Parser, Debug)]
#[command(name = "pcat-ingest")]
#[command(about = "Multi-source product consolidation and taxonomy classification")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/pcat/config.toml)
    #[arg(short, long, env = "PCAT_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database, cache and taxonomy
    #[arg(short, long, env = "PCAT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch over identifiers given on the command line and/or a working set file
    Run {
        identifiers: Vec<String>,

        /// Working set file, one identifier per line; rewritten after filtering
        #[arg(short, long)]
        working_set: Option<PathBuf>,

        /// Scraper export to read, as NAME=PATH or PATH (name from the file stem)
        #[arg(short, long = "source", value_name = "SOURCE")]
        sources: Vec<String>,

        /// Sources to run first, comma separated
        #[arg(long, value_delimiter = ',')]
        order: Vec<String>,

        /// Run only the sources named in --order
        #[arg(long)]
        only_ordered: bool,

        /// Remove persisted identifiers from the working set
        #[arg(long)]
        remove_processed: bool,

        /// Classifier override: llm, local_llm or mock
        #[arg(long)]
        classifier: Option<ClassifierKind>,
    },

    /// Classify one product and print the result
    Classify {
        name: String,

        #[arg(short, long, default_value = "")]
        brand: String,

        /// Classifier override: llm, local_llm or mock
        #[arg(long)]
        classifier: Option<ClassifierKind>,
    },

    /// Rebuild the taxonomy file from classified products in the store
    RefreshTaxonomy,

    /// Delete every classification cache entry
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = load_toml_config(cli.config.as_deref()).context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pcat_ingest={level},pcat_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pcat-ingest v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), &toml_config);
    let initializer = RootFolderInitializer::new(root_folder, &toml_config);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root().display());

    match cli.command {
        Command::Run {
            identifiers,
            working_set,
            sources,
            order,
            only_ordered,
            remove_processed,
            classifier,
        } => {
            let mut batch_config = BatchConfig::from_toml(&toml_config);
            batch_config.remove_processed |= remove_processed;
            let plan = if order.is_empty() {
                None
            } else {
                Some(SourcePlan::explicit(order, !only_ordered))
            };
            run_batch(
                &toml_config,
                &initializer,
                batch_config,
                RunArgs {
                    identifiers,
                    working_set,
                    sources,
                    plan,
                    classifier,
                },
            )
            .await
        }
        Command::Classify {
            name,
            brand,
            classifier,
        } => classify_product(&toml_config, &initializer, name, brand, classifier).await,
        Command::RefreshTaxonomy => refresh_taxonomy(&initializer).await,
        Command::ClearCache => {
            let mut cache = ClassificationCache::open(initializer.cache_path());
            let removed = cache.clear().context("Failed to clear classification cache")?;
            println!("Removed {} cached classifications", removed);
            Ok(())
        }
    }
}

struct RunArgs {
    identifiers: Vec<String>,
    working_set: Option<PathBuf>,
    sources: Vec<String>,
    plan: Option<SourcePlan>,
    classifier: Option<ClassifierKind>,
}

async fn run_batch(
    toml_config: &TomlConfig,
    initializer: &RootFolderInitializer,
    batch_config: BatchConfig,
    args: RunArgs,
) -> Result<()> {
    let mut registry = SourceRegistry::new();
    for source_arg in &args.sources {
        registry.register(Arc::new(parse_source(source_arg)));
    }
    if registry.is_empty() {
        bail!("No sources given; pass --source NAME=PATH for each scraper export");
    }
    info!("Sources: {}", registry.names().join(", "));

    let working_set = args.working_set.map(WorkingSet::new);
    let mut identifiers = args.identifiers;
    if let Some(ws) = &working_set {
        let listed = ws
            .load()
            .await
            .with_context(|| format!("Failed to read working set {}", ws.path().display()))?;
        info!("Working set {}: {} identifiers", ws.path().display(), listed.len());
        identifiers.extend(listed);
    }
    if identifiers.is_empty() {
        bail!("No identifiers given");
    }

    let store = open_store(initializer).await?;
    let pipeline = build_pipeline(toml_config, initializer, &store, args.classifier).await?;

    let event_bus = EventBus::new(toml_config.batch.event_capacity);
    let printer = tokio::spawn(print_events(event_bus.subscribe()));

    let mut orchestrator = BatchOrchestrator::new(registry, pipeline, store, event_bus, batch_config);
    if let Some(ws) = working_set {
        orchestrator = orchestrator.with_working_set(ws);
    }

    let mut request = BatchRequest::new(identifiers);
    if let Some(plan) = args.plan {
        request = request.with_plan(plan);
    }

    let cancel_token = CancellationToken::new();
    let batch_token = cancel_token.clone();
    let mut batch = tokio::spawn(async move { orchestrator.run(request, batch_token).await });

    let report = tokio::select! {
        joined = &mut batch => joined,
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl+C, finishing current identifier and wrapping up");
            cancel_token.cancel();
            batch.await
        }
    }
    .context("Batch task panicked")?
    .context("Batch failed")?;

    if let Err(e) = printer.await {
        warn!("Progress printer stopped: {}", e);
    }
    print_report(&report);
    Ok(())
}

async fn classify_product(
    toml_config: &TomlConfig,
    initializer: &RootFolderInitializer,
    name: String,
    brand: String,
    classifier: Option<ClassifierKind>,
) -> Result<()> {
    let store = open_store(initializer).await?;
    let mut pipeline = build_pipeline(toml_config, initializer, &store, classifier).await?;

    let product = ProductDescriptor::new(name, brand);
    let outcome = pipeline.classify_one(&product).await;

    println!("tier:       {}", outcome.tier.as_str());
    println!("confidence: {:.2}", outcome.confidence);
    println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    Ok(())
}

async fn refresh_taxonomy(initializer: &RootFolderInitializer) -> Result<()> {
    let store = open_store(initializer).await?;
    let taxonomy = Taxonomy::refresh_from_store(&store).await?;
    if taxonomy.is_empty() {
        warn!("Store holds no classified products, keeping the existing taxonomy");
        return Ok(());
    }

    let path = initializer.taxonomy_path();
    taxonomy
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "Wrote {} categories and {} pages to {}",
        taxonomy.categories.len(),
        taxonomy.pages.len(),
        path.display()
    );
    Ok(())
}

async fn open_store(initializer: &RootFolderInitializer) -> Result<ProductStore> {
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open product store {}", db_path.display()))?;
    Ok(ProductStore::new(pool))
}

async fn build_pipeline(
    toml_config: &TomlConfig,
    initializer: &RootFolderInitializer,
    store: &ProductStore,
    classifier_override: Option<ClassifierKind>,
) -> Result<ClassificationPipeline> {
    let mut config = PipelineConfig::from_toml(toml_config)?;
    if let Some(kind) = classifier_override {
        config.classifier.kind = kind;
    }

    let classifier = build_classifier(&config.classifier)
        .with_context(|| format!("Failed to set up the {} classifier", config.classifier.kind))?;
    let cache = ClassificationCache::open(initializer.cache_path());
    let taxonomy_path = initializer.taxonomy_path();
    let taxonomy = Taxonomy::load_or_builtin(Some(taxonomy_path.as_path()))?;
    let corpus = store.historical_items().await?;

    Ok(ClassificationPipeline::new(&config, classifier, cache, taxonomy, corpus))
}

/// `NAME=PATH`, or a bare path named after its file stem
fn parse_source(source_arg: &str) -> JsonFileSource {
    match source_arg.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() => {
            JsonFileSource::new(name.trim(), Path::new(path.trim()))
        }
        _ => JsonFileSource::from_path(source_arg.trim()),
    }
}

async fn print_events(mut rx: broadcast::Receiver<CatalogEvent>) {
    loop {
        match rx.recv().await {
            Ok(CatalogEvent::SourceStarted { source, total, .. }) => {
                println!("[{}] starting, {} identifiers", source, total);
            }
            Ok(CatalogEvent::SourceProgress {
                source,
                identifier,
                current,
                total,
                percentage,
                elapsed_seconds,
                estimated_remaining_seconds,
                ..
            }) => {
                println!(
                    "[{}] {}/{} ({:.0}%) {} - {}",
                    source,
                    current,
                    total,
                    percentage,
                    format_progress_times(elapsed_seconds, estimated_remaining_seconds),
                    identifier
                );
            }
            Ok(CatalogEvent::SourceFinished {
                source,
                observations,
                failures,
                failed,
                ..
            }) => {
                let status = if failed { "FAILED" } else { "done" };
                println!(
                    "[{}] {}: {} observations, {} failures",
                    source, status, observations, failures
                );
            }
            Ok(CatalogEvent::BatchStateChanged { new_state, .. }) => {
                println!("== {:?}", new_state);
            }
            Ok(CatalogEvent::ItemClassified { .. }) => {}
            Ok(CatalogEvent::BatchFinished { .. }) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(n)) => warn!("Progress display skipped {} events", n),
        }
    }
}

fn print_report(report: &BatchReport) {
    println!();
    println!("Batch {} {:?}", report.batch_id, report.state);
    for (identifier, outcome) in &report.outcomes {
        let line = match outcome {
            IdentifierOutcome::InvalidIdentifier => "invalid identifier".to_string(),
            IdentifierOutcome::AlreadyStored => "already stored".to_string(),
            IdentifierOutcome::NotFound => "not found in any source".to_string(),
            IdentifierOutcome::Persisted { tier, category } => {
                format!("persisted [{}] {}", tier.as_str(), category)
            }
            IdentifierOutcome::PersistFailed(e) => format!("persist failed: {}", e),
        };
        println!("  {:<14} {}", identifier, line);
    }
    println!(
        "{} persisted, {} skipped, {} errors{}",
        report.persisted(),
        report.skipped(),
        report.errors.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
}
