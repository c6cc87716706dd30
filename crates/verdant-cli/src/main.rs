//! `verdant` command-line tool.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::VerdantConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use verdant_core::{Category, SearchFilters};
use verdant_eval::{ensure_usable, Evaluator, QuerySet};
use verdant_search::{GenerationStore, JsonlRecordSource, RecordSource, SearchEngine, SearchRequest};

#[derive(Parser)]
#[command(name = "verdant", about = "Verdant: hybrid search over climate-tech organizations")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "verdant.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a fresh index generation from a JSONL catalog and make it current
    Build {
        /// Catalog file, one organization record per line
        #[arg(long)]
        catalog: PathBuf,
        /// Reject records whose category label is not recognized
        #[arg(long)]
        strict: bool,
    },
    /// Add or replace records on top of the current generation
    Add {
        /// Catalog file with the new records
        #[arg(long)]
        catalog: PathBuf,
        /// Reject records whose category label is not recognized
        #[arg(long)]
        strict: bool,
    },
    /// Run a query against the current generation
    Search {
        /// Free-text query
        query: String,
        /// Number of results (defaults to search.top_k_default)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Restrict to one category, e.g. "clean_energy"
        #[arg(long)]
        category: Option<String>,
        /// Only organizations founded in or after this year
        #[arg(long)]
        founded_after: Option<i32>,
        /// Only organizations founded in or before this year
        #[arg(long)]
        founded_before: Option<i32>,
        /// Minimum total funding in USD
        #[arg(long)]
        min_funding: Option<f64>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score the current generation against a labeled query set
    Evaluate {
        /// Query set (JSON)
        #[arg(long)]
        queries: PathBuf,
        /// Results requested per query
        #[arg(long, default_value_t = 20)]
        depth: usize,
        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the current generation and every stored one
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = VerdantConfig::load(&cli.config).await?;
    let store = GenerationStore::new(config.index_dir());

    match cli.command {
        Commands::Build { catalog, strict } => {
            let engine = open_engine(&config).await?;
            let source = JsonlRecordSource::new(catalog).strict(strict);
            info!(source = %source.describe(), "Building generation");

            let generation = engine.rebuild(&source).await?;
            let dir = store.save(&generation).await?;
            info!(dir = %dir.display(), "Generation saved");
            println!("{}", serde_json::to_string_pretty(&generation.stats())?);
        }
        Commands::Add { catalog, strict } => {
            let engine = load_engine(&config, &store).await?;
            let source = JsonlRecordSource::new(catalog).strict(strict);
            let records = source.snapshot().await?;
            info!(source = %source.describe(), count = records.len(), "Adding records");

            let generation = engine.add_records(records).await?;
            store.save(&generation).await?;
            println!("{}", serde_json::to_string_pretty(&generation.stats())?);
        }
        Commands::Search {
            query,
            top_k,
            category,
            founded_after,
            founded_before,
            min_funding,
            json,
        } => {
            let engine = load_engine(&config, &store).await?;
            let category = category
                .map(|label| Category::parse_strict(&label))
                .transpose()?;
            let filters = SearchFilters {
                category,
                founded_year_min: founded_after,
                founded_year_max: founded_before,
                min_funding_usd: min_funding,
            };

            let generation = engine.current_generation()?;
            let response = engine
                .search_in(
                    &generation,
                    SearchRequest::new(query)
                        .with_top_k(top_k.unwrap_or(0))
                        .with_filters(filters),
                )
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            if response.degraded {
                println!("(semantic retrieval unavailable; lexical results only)");
            }
            if response.hits.is_empty() {
                println!("No results for \"{}\"", response.query);
            }
            for hit in &response.hits {
                match generation.record(hit.record_id) {
                    Some(record) => println!(
                        "{:>3}. {} [{}] {:.4}  {}",
                        hit.rank,
                        record.name,
                        record.category.display_name(),
                        hit.score,
                        record.short_description
                    ),
                    None => println!("{:>3}. #{} {:.4}", hit.rank, hit.record_id, hit.score),
                }
            }
        }
        Commands::Evaluate {
            queries,
            depth,
            output,
        } => {
            let engine = load_engine(&config, &store).await?;
            let set = QuerySet::load(&queries).await?;
            let report = Evaluator::new(&engine)
                .with_depth(depth)
                .evaluate(&set.queries)
                .await;

            let rendered = serde_json::to_string_pretty(&report)?;
            if let Some(path) = output {
                tokio::fs::write(&path, &rendered)
                    .await
                    .with_context(|| format!("Failed to write report '{}'", path.display()))?;
                info!(path = %path.display(), "Evaluation report written");
            }
            println!("{rendered}");
            ensure_usable(&report)?;
        }
        Commands::Stats => {
            let manifests = store.list().await?;
            let current = store.current_id().await?;
            for manifest in &manifests {
                let marker = if Some(manifest.id) == current { "*" } else { " " };
                println!(
                    "{marker} {} {} records={} vectors={}",
                    manifest.id,
                    manifest.built_at.to_rfc3339(),
                    manifest.record_count,
                    manifest.vector_count
                );
            }
            match store.load_current().await? {
                Some(generation) => {
                    println!("{}", serde_json::to_string_pretty(&generation.stats())?)
                }
                None => println!("No generation built yet"),
            }
        }
    }

    Ok(())
}

async fn open_engine(config: &VerdantConfig) -> anyhow::Result<SearchEngine> {
    let engine = SearchEngine::from_config(config.search.clone(), config.embedder()?).await?;
    Ok(engine)
}

/// Open an engine and install the stored current generation.
async fn load_engine(
    config: &VerdantConfig,
    store: &GenerationStore,
) -> anyhow::Result<SearchEngine> {
    let engine = open_engine(config).await?;
    let generation = store.load_current().await?.ok_or_else(|| {
        anyhow::anyhow!(
            "No index in '{}'; run `verdant build` first",
            store.root().display()
        )
    })?;

    let dimension = generation.vectors().dimension();
    if dimension != config.search.vector_dimension {
        anyhow::bail!(
            "Stored generation has dimension {dimension} but search.vector_dimension is {}",
            config.search.vector_dimension
        );
    }
    engine.install(generation);
    Ok(engine)
}
