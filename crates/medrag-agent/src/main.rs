//! Medical RAG assistant: agentic controller, tool registry, and
//! chat/ingestion CLI (§4.7-4.11, §6).
//!
//! Wires the retrieval engine in `medrag-core` to a tool-calling LLM loop,
//! exposed both as an HTTP chat API and as a handful of CLI subcommands.

mod agent;
mod cli;
mod http;
mod session;
mod tools;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use medrag_core::config::Config;
use medrag_core::embeddings::Embeddings;
use medrag_core::fhir::FhirAdapter;
use medrag_core::memory::VectorMemory;
use medrag_core::store::DataStore;

use crate::agent::provider::OpenAiCompatibleProvider;

#[derive(Parser)]
#[command(name = "medrag", version, about = "Medical RAG assistant: retrieval engine, agent, and CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check configuration and, optionally, live dependency health.
    CheckHealth {
        #[arg(long)]
        smoke_test: bool,
    },
    /// Create the local data directory and report missing configuration.
    FixEnvironment,
    /// Run a single chat turn against the retrieval engine and LLM.
    Chat {
        query: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        quiet: bool,
    },
    /// Ingest a directory of DICOM files into the image vector store.
    IngestMimic {
        #[arg(long)]
        source: PathBuf,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Default; kept so `--skip-existing` can be passed explicitly.
        #[arg(long, conflicts_with = "no_skip_existing")]
        skip_existing: bool,
        #[arg(long)]
        no_skip_existing: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        create_fhir: bool,
    },
    /// Start the chat HTTP API (`POST /set_patient`, `/chat`, `/reset`).
    Serve,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckHealth { smoke_test } => {
            let healthy = cli::check_health(&config, smoke_test).await;
            std::process::exit(if healthy { 0 } else { 1 });
        }
        Command::FixEnvironment => {
            cli::fix_environment(&config).await;
        }
        Command::Chat { query, provider, quiet } => {
            cli::chat(&config, query, provider, quiet).await;
        }
        Command::IngestMimic { source, batch_size, limit, skip_existing, no_skip_existing, dry_run, create_fhir } => {
            let _ = skip_existing; // default behavior; flag exists only to be explicit
            let args = cli::IngestArgs {
                source,
                batch_size,
                limit,
                skip_existing: !no_skip_existing,
                dry_run,
                create_fhir,
            };
            let ok = cli::ingest_mimic(&config, args).await;
            std::process::exit(if ok { 0 } else { 1 });
        }
        Command::Serve => {
            serve(config).await;
        }
    }
}

async fn serve(config: Config) {
    info!("medrag-agent starting on port {}", config.http_port);

    let store = match DataStore::open(&config.data_dir) {
        Ok(store) => store,
        Err(err) => {
            error!("failed to open data store: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = store.ensure_tables() {
        error!("failed to initialize schema: {err}");
        std::process::exit(1);
    }

    let embeddings = Arc::new(Embeddings::new(config.embedding_url.clone()));
    let fhir = Arc::new(FhirAdapter::connect(config.fhir_base_url.clone()).await);
    let memory = Arc::new(VectorMemory::default());
    let provider = Arc::new(OpenAiCompatibleProvider::new(
        config.llm_url.clone(),
        config.llm_api_key.clone(),
        "medrag-agent",
    ));

    let state = Arc::new(http::AppState::new(Arc::new(store), embeddings, Some(fhir), memory, provider));
    let app = http::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!("listening on {addr}");
    if let Err(err) = axum::serve(listener, app).await {
        error!("server error: {err}");
        std::process::exit(1);
    }
}
