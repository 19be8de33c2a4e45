//! `scout` CLI: run the indexing pipeline and poke at its two indexes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use scout_ai_embed::{EmbedConfig, FastEmbedProvider};
use scout_ai_indexer::catalog::{FileCatalog, SqliteCatalog};
use scout_ai_indexer::config::ScoutConfig;
use scout_ai_indexer::parse::ContentParser;
use scout_ai_indexer::router::QueryRouter;
use scout_ai_indexer::store::VectorStore;
use scout_ai_indexer::sync::SyncEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Local file assistant indexing pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration and create the databases.
    Init,
    /// Run the synchronization pipeline until interrupted.
    Run,
    /// Similarity-search the vector store.
    Search {
        /// Query text.
        query: String,
        /// Maximum number of results.
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Route a structured query with vector fallback.
    Query {
        /// The structured (SQL) query to try first.
        sql: String,
        /// The original question, used for the fallback search.
        #[arg(short, long)]
        question: String,
    },
    /// Show index statistics.
    Stats,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scout")
        .join("config.toml")
}

async fn open_catalog(config: &ScoutConfig) -> Result<Arc<SqliteCatalog>> {
    if let Some(parent) = config.catalog_db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(Arc::new(
        SqliteCatalog::open(
            &config.catalog_db_path,
            config.index_folders.clone(),
            config.index_folder_exceptions.clone(),
        )
        .await?,
    ))
}

async fn open_store(config: &ScoutConfig) -> Result<Arc<VectorStore>> {
    if let Some(parent) = config.vector_db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let embedder = FastEmbedProvider::create(EmbedConfig::new(&config.embedding_model)).await?;
    Ok(Arc::new(
        VectorStore::open(
            &config.vector_db_path,
            ContentParser::with_defaults(),
            Arc::new(embedder),
            config.vector_store_config(),
        )
        .await?,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = ScoutConfig::load_or_init(&config_path).await?;

    match args.command {
        Commands::Init => {
            let catalog = open_catalog(&config).await?;
            catalog.refresh().await?;
            let store = open_store(&config).await?;
            let stats = store.stats().await?;
            println!(
                "Initialized. Config: {}, catalog: {}, store: {} ({} chunks)",
                config_path.display(),
                config.catalog_db_path.display(),
                config.vector_db_path.display(),
                stats.chunks
            );
        }
        Commands::Run => {
            let catalog = open_catalog(&config).await?;
            let store = open_store(&config).await?;
            let handle =
                SyncEngine::spawn(catalog, store, vec![], config.sync_engine_config());

            handle.wait_ready().await?;
            println!("Index ready; monitoring for changes. Press Ctrl-C to stop.");

            tokio::signal::ctrl_c().await?;
            println!("Stopping...");
            handle.shutdown().await?;
        }
        Commands::Search { query, limit } => {
            let store = open_store(&config).await?;
            let results = store.search(&query, limit).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (similarity, chunk) in results {
                println!("[{similarity:.3}] {} ({})", chunk.chunk_id, chunk.path);
                println!("{}\n", chunk.content);
            }
        }
        Commands::Query { sql, question } => {
            let catalog = open_catalog(&config).await?;
            let store = open_store(&config).await?;
            let router = QueryRouter::new(catalog, store, config.top_k);
            let routed = router.resolve(&sql, &question).await;
            print!("{}", routed.provenance.preface());
            println!("{}", routed.context);
        }
        Commands::Stats => {
            let catalog = open_catalog(&config).await?;
            let files = catalog
                .execute("SELECT COUNT(*) AS files FROM file_metadata")
                .await?;
            let store = open_store(&config).await?;
            let stats = store.stats().await?;
            println!("Catalog: {}", files.to_context_lines());
            println!(
                "Store: {} chunks over {} files, {} embedded",
                stats.chunks, stats.files, stats.embedded
            );
        }
    }

    Ok(())
}
