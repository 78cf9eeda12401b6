mod chat;
mod commands;
mod docs;
mod evidence;
mod llm;
mod orchestrator;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};

use docs::DocumentStore;
use llm::LlmClient;
use orchestrator::Orchestrator;
use state::{AppState, OrchestratorConfig};

/// WeFlora planting assistant: evidence-gated answers over project documents
#[derive(Debug, Parser)]
#[command(name = "weflora", version)]
struct Cli {
    /// Directory of the context and chat store
    #[arg(long, env = "WEFLORA_DATA_DIR", default_value = "./data/store")]
    data_dir: PathBuf,
    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env before clap reads env-backed flags
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let store = Arc::new(DocumentStore::new(&cli.data_dir).await?);
    info!("Document store initialized at {:?}", cli.data_dir);

    let llm_client = Arc::new(LlmClient::from_env()?);
    info!("LLM client initialized");

    let config = OrchestratorConfig::from_env();
    let orchestrator = Arc::new(Orchestrator::new(llm_client, &config));

    let app_state = AppState {
        store,
        orchestrator,
        config,
    };

    commands::run(&app_state, cli.command).await
}
