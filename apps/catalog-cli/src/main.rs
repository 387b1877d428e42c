use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use catalog_core::config::{expand_path, Config, Settings};
use catalog_core::{SearchRequest, Strategy};
use catalog_embed::{get_default_embedder, get_default_reranker};
use catalog_search::{build_service, SearchService};
use catalog_store::{DocumentStore, MemoryStore, MongoStore};

#[derive(Parser)]
#[command(name = "catalog-search", about = "Store-scoped product search")]
struct Cli {
    /// Serve from a JSON array of product documents instead of MongoDB.
    ///
    /// `demos/products.json` carries 8-dimensional vectors; for strategies 3 and 4
    /// run it with `APP_USE_FAKE_EMBEDDINGS=1 APP_VOYAGE__DIMENSIONS=8`.
    #[arg(long, global = true, env = "APP_FIXTURE")]
    fixture: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one search and print the response as JSON.
    Search(SearchArgs),
    /// Check that the document store answers.
    Ping,
}

#[derive(Args)]
struct SearchArgs {
    query: String,
    #[arg(long)]
    store: String,
    /// 1 keyword, 2 full-text, 3 vector, 4 hybrid.
    #[arg(long, default_value_t = 1)]
    strategy: u8,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 10)]
    page_size: u32,
    /// Hybrid only.
    #[arg(long)]
    weight_vector: Option<f64>,
    /// Hybrid only.
    #[arg(long)]
    weight_text: Option<f64>,
    /// Rerank the page of a vector search.
    #[arg(long)]
    rerank: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Config::load()?.settings().context("loading settings")?;
    let service = wire(&settings, cli.fixture.as_deref()).await?;

    match cli.command {
        Command::Ping => {
            service.health().await.context("store ping")?;
            info!("store is reachable");
            println!("ok");
        }
        Command::Search(args) => {
            let strategy = Strategy::from_selector(args.strategy, args.weight_vector, args.weight_text)?;
            let req = SearchRequest::new(args.query, args.store, strategy, args.page, args.page_size);
            let response = if args.rerank {
                let result = service.search_with_rerank(&req).await?;
                catalog_core::SearchResponse::from_result(result, req.page, req.page_size)
            } else {
                service.respond(&req).await?
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}

/// Build every client once and hand them to the service explicitly.
async fn wire(settings: &Settings, fixture: Option<&str>) -> anyhow::Result<SearchService> {
    let store: Arc<dyn DocumentStore> = match fixture {
        Some(path) => {
            let path = expand_path(path);
            let store = MemoryStore::from_json_file(&path)?;
            info!(path = %path.display(), documents = store.len(), "serving from fixture");
            Arc::new(store)
        }
        None => Arc::new(MongoStore::connect(&settings.mongodb).await?),
    };
    let retry = settings.retry.policy();
    Ok(build_service(settings, store)
        .with_embedder(get_default_embedder(&settings.voyage, &retry)?)
        .with_reranker(get_default_reranker(&settings.voyage, &retry)?))
}
