//! CLI subcommand handlers (§6, §9.2): `check-health`, `fix-environment`,
//! `chat`, `ingest-mimic`. `main.rs` wires these to `clap`'s derive parser;
//! everything here works directly off a `Config` so it stays testable
//! without a process boundary.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use medrag_core::config::Config;
use medrag_core::embeddings::Embeddings;
use medrag_core::fhir::FhirAdapter;
use medrag_core::ingest::{self, DefaultMetadataReader};
use medrag_core::memory::VectorMemory;
use medrag_core::store::DataStore;

use crate::agent::provider::{Message, OpenAiCompatibleProvider};
use crate::agent::AgentController;
use crate::tools::{ToolContext, ToolRegistry};

/// `check-health [--smoke-test]` (§6, §9.2): without `--smoke-test`, only
/// confirms configuration loads and the data directory is writable. With
/// it, additionally exercises the Data Store Adapter, Embedding Client,
/// and FHIR Adapter health checks — the equivalent of the original
/// project's `verify_tools_ec2.py` smoke test, minus a live LLM call.
pub async fn check_health(config: &Config, smoke_test: bool) -> bool {
    println!("{}", "Checking configuration...".bold());
    println!("  data_dir:      {}", config.data_dir.display());
    println!("  fhir_base_url: {}", config.fhir_base_url);
    println!("  embedding_url: {}", config.embedding_url);
    println!("  llm_url:       {}", config.llm_url);

    let mut healthy = true;

    match DataStore::open(&config.data_dir) {
        Ok(store) => {
            if let Err(err) = store.ensure_tables() {
                healthy = false;
                println!("  {} data store: {err}", "FAIL".red());
            } else {
                println!("  {} data store reachable at {}", "OK".green(), config.data_dir.display());
            }
        }
        Err(err) => {
            healthy = false;
            println!("  {} data store: {err}", "FAIL".red());
        }
    }

    if smoke_test {
        let embeddings = Embeddings::new(config.embedding_url.clone());
        if embeddings.health_check().await {
            println!("  {} embedding service at {}", "OK".green(), config.embedding_url);
        } else {
            healthy = false;
            println!("  {} embedding service unreachable at {}", "FAIL".red(), config.embedding_url);
        }

        let fhir = FhirAdapter::connect(config.fhir_base_url.clone()).await;
        if fhir.demo_mode() {
            println!("  {} FHIR server unreachable, demo mode engaged", "WARN".yellow());
        } else {
            println!("  {} FHIR server at {}", "OK".green(), config.fhir_base_url);
        }
    }

    println!("{}", if healthy { "healthy".green() } else { "unhealthy".red() });
    healthy
}

/// `fix-environment` (§6): create the data directory if missing and print
/// guidance for any unset required environment variable, rather than
/// mutating anything remote.
pub async fn fix_environment(config: &Config) {
    println!("{}", "Repairing local environment...".bold());

    match std::fs::create_dir_all(&config.data_dir) {
        Ok(()) => println!("  {} data directory ready at {}", "OK".green(), config.data_dir.display()),
        Err(err) => println!("  {} could not create {}: {err}", "FAIL".red(), config.data_dir.display()),
    }

    for (name, value) in [
        ("FHIR_BASE_URL", &config.fhir_base_url),
        ("EMBEDDING_URL", &config.embedding_url),
        ("LLM_URL", &config.llm_url),
    ] {
        println!("  {name} = {value}");
    }

    if config.llm_api_key.is_none() {
        println!(
            "  {} LLM_API_KEY is unset; the chat subcommand will send unauthenticated requests",
            "WARN".yellow()
        );
    }
}

/// `chat <query> [--provider] [--quiet]` (§6, §9.2): runs a single turn
/// against the configured retrieval engine and LLM provider, printing the
/// reply and, unless `--quiet`, the tool-call trace.
pub async fn chat(config: &Config, query: String, provider_url: Option<String>, quiet: bool) {
    let store = match DataStore::open(&config.data_dir) {
        Ok(store) => {
            if let Err(err) = store.ensure_tables() {
                eprintln!("{} {err}", "error:".red());
                return;
            }
            Arc::new(store)
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red());
            return;
        }
    };

    let embeddings = Arc::new(Embeddings::new(config.embedding_url.clone()));
    let fhir = Arc::new(FhirAdapter::connect(config.fhir_base_url.clone()).await);
    let memory = Arc::new(VectorMemory::default());
    let tools = Arc::new(ToolRegistry::with_default_tools());

    let base_url = provider_url.unwrap_or_else(|| config.llm_url.clone());
    let provider = Arc::new(OpenAiCompatibleProvider::new(base_url, config.llm_api_key.clone(), "medrag-agent"));
    let agent = AgentController::new(provider, Arc::clone(&tools));

    let ctx = ToolContext {
        store,
        embeddings,
        fhir: Some(fhir),
        memory,
        session_id: "cli".to_string(),
        patient_id: None,
    };

    let mut history: Vec<Message> = Vec::new();
    let result = agent.run_turn(&ctx, &mut history, &query).await;

    if !quiet {
        for step in &result.trace {
            println!("{} [{}] {} {}", "tool".cyan(), step.iteration, step.name, step.input);
        }
    }
    println!("{}", result.reply);
}

/// `ingest-mimic --source PATH [...]` (§4.8, §6).
pub struct IngestArgs {
    pub source: PathBuf,
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub skip_existing: bool,
    pub dry_run: bool,
    pub create_fhir: bool,
}

pub async fn ingest_mimic(config: &Config, args: IngestArgs) -> bool {
    let store = match DataStore::open(&config.data_dir) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("{} {err}", "error:".red());
            return false;
        }
    };
    if let Err(err) = store.ensure_tables() {
        eprintln!("{} {err}", "error:".red());
        return false;
    }

    let embeddings = Embeddings::new(config.embedding_url.clone());
    let fhir = if args.create_fhir { Some(FhirAdapter::connect(config.fhir_base_url.clone()).await) } else { None };
    let reader = DefaultMetadataReader;

    let options = ingest::IngestOptions {
        source: args.source,
        batch_size: args.batch_size,
        limit: args.limit,
        skip_existing: args.skip_existing,
        dry_run: args.dry_run,
        create_fhir: args.create_fhir,
    };

    match ingest::run(&store, &embeddings, fhir.as_ref(), &reader, &options).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            report.errored == 0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red());
            false
        }
    }
}
