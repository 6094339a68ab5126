use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use lore_core::config::{Config, Settings};
use lore_embed::build_embedder;
use lore_index::{IndexManager, PersistedState, RetrievalRouter};
use lore_vector::LanceConnector;

/// Persona prompts never carry more context than this.
const DEFAULT_MAX_CHARS: usize = 2000;

#[derive(Parser)]
#[command(name = "lore", version, about = "Per-domain retrieval indexes over structured corpora")]
struct Cli {
    /// Configuration file; `<stem>.<RUST_ENV>.toml` and APP_* variables are merged on top.
    #[arg(long, global = true, env = "LORE_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load or build every configured domain and report which are ready
    Init,
    /// Retrieve context for a query from one domain
    Query {
        domain: String,
        text: String,
        /// Number of documents; defaults to the domain's configured top_k
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
        max_chars: usize,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show persisted index state per domain without building anything
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Config::load_from(&cli.config)?.settings()?;
    info!(config = %cli.config.display(), domains = settings.domains.len(), "configuration loaded");

    match cli.command {
        Command::Init => init(&settings).await,
        Command::Query { domain, text, top_k, max_chars, json } => {
            query(&settings, &domain, &text, top_k, max_chars, json).await
        }
        Command::Status => status(&settings).await,
    }
}

fn manager(settings: &Settings) -> Result<IndexManager> {
    let embedder = build_embedder(&settings.embedding)?;
    Ok(IndexManager::new(&settings.data.persist_dir, embedder, Arc::new(LanceConnector))
        .with_batch_size(settings.embedding.batch_size))
}

async fn init(settings: &Settings) -> Result<()> {
    if settings.domains.is_empty() {
        bail!("no domains configured");
    }
    let mut manager = manager(settings)?;
    let report = manager.ensure_all(&settings.domains).await;
    report.log();

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => println!("✅ {:<16} {} ({} documents)", outcome.domain, summary.origin, summary.document_count),
            Err(e) => println!("❌ {:<16} {}", outcome.domain, e),
        }
    }
    if report.ready().is_empty() {
        bail!("no domain is ready");
    }
    Ok(())
}

async fn query(settings: &Settings, domain: &str, text: &str, top_k: Option<usize>, max_chars: usize, json: bool) -> Result<()> {
    let mut manager = manager(settings)?;
    // Unconfigured or failed domains stay unregistered and surface as not ready below.
    if let Some(config) = settings.domain(domain) {
        if let Err(e) = manager.ensure(config).await {
            error!(domain, error = %e, "domain failed to initialize");
        }
    }
    let router = RetrievalRouter::new(manager.into_registry());
    debug!(ready = ?router.registry().domains(), "router ready");
    let result = match top_k {
        Some(k) => router.retrieve(domain, text, k).await?,
        None => router.retrieve_default(domain, text).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    if result.is_empty() {
        println!("No documents retrieved.");
        return Ok(());
    }
    for (rank, hit) in result.hits.iter().enumerate() {
        println!("{}. {} (score {:.3})", rank + 1, hit.document.id, hit.score);
    }
    println!("\n{}", result.context_within(max_chars));
    Ok(())
}

async fn status(settings: &Settings) -> Result<()> {
    let manager = manager(settings)?;
    println!("Index root: {}", settings.data.persist_dir.display());
    for domain in &settings.domains {
        match manager.inspect(domain).await {
            Ok(PersistedState::Valid(manifest)) => println!(
                "{:<16} valid   {} documents, {} built {}",
                domain.name, manifest.document_count, manifest.embedder_id, manifest.built_at
            ),
            Ok(PersistedState::Invalid(reason)) => println!("{:<16} rebuild {}", domain.name, reason),
            Err(e) => println!("{:<16} unknown {:#}", domain.name, e),
        }
    }
    Ok(())
}
