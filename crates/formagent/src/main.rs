//! FormAgent Daemon - chat-driven form builder API

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use formagent::ai::SafeAIClient;
use formagent::config::Config;
use formagent::conversation::{
    ConversationHistoryService, ConversationRepository, JsonFileRepository, MemoryRepository,
};
use formagent::error::Result;
use formagent::fallback::FallbackResponder;
use formagent::guardrails::GuardrailsEngine;
use formagent::server::FormAgentServer;

/// FormAgent - chat assistant that builds data-collection forms
#[derive(Parser)]
#[command(name = "formagent")]
#[command(about = "A chat-driven form builder with conversation memory and guardrails")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the API server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,formagent=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        return read_config(&path);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".formagent").join("config.toml")),
        dirs::config_dir().map(|c| c.join("formagent").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return read_config(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

fn read_config(path: &PathBuf) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        formagent::FormAgentError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content)
        .map_err(|e| formagent::FormAgentError::Config(format!("Failed to parse config: {e}")))
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting FormAgent daemon");

    let config = load_config(config_path)?;
    tracing::debug!("Config loaded: {:?}", config);

    let repo: Arc<dyn ConversationRepository> = if config.memory.persist {
        tracing::info!(
            "Persisting conversations under: {}",
            config.memory.data_dir.display()
        );
        Arc::new(JsonFileRepository::new(config.memory.data_dir.clone()).await?)
    } else {
        tracing::info!("Conversation persistence disabled, using in-memory store");
        Arc::new(MemoryRepository::new())
    };

    let guardrails = Arc::new(GuardrailsEngine::new(config.guardrails.clone()));

    let service = Arc::new(ConversationHistoryService::new(
        repo,
        guardrails.clone(),
        config.memory.clone(),
        config.personality.clone(),
    ));

    let responder = FallbackResponder::new(config.personality.assistant_name.clone());
    let ai = Arc::new(SafeAIClient::new(&config.ai, responder));

    let server = FormAgentServer::new(config, service, guardrails, ai);
    server.serve().await?;

    tracing::info!("FormAgent daemon stopped");
    Ok(())
}
