//! News agent service - main entry point
//!
//! Loads configuration, resolves secrets, and serves the HTTP API until
//! SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use news_agent::config::AppConfig;
use news_agent::crew::{CrewSettings, NewsCrew};
use news_agent::error::{AppError, AppResult};
use news_agent::llm::providers::build_provider;
use news_agent::observability::{init_default_logging, init_logging, LogFormat};
use news_agent::server::{self, AppState};
use news_agent::tools::ToolRegistry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};

/// Researches a news topic with two LLM agents and returns a markdown summary
#[derive(Parser)]
#[command(name = "news-agent")]
#[command(about = "AI news research and summary API")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(Level::DEBUG, LogFormat::Compact, false),
        _ => init_logging(Level::TRACE, LogFormat::Compact, true),
    }

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => run_server(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

/// Wire dependencies from configuration. Fails before anything binds if a
/// secret is missing; an unreachable model server is only logged.
async fn build_state(config: &AppConfig) -> AppResult<AppState> {
    let search_api_key = config.get_search_api_key()?;
    let llm_api_key = config.get_llm_api_key()?;

    let provider = build_provider(&config.llm, llm_api_key)
        .map_err(|e| AppError::llm_error(e.to_string()))?;
    let tools = ToolRegistry::from_config(config, search_api_key)?;
    info!(
        provider = provider.name(),
        model = %config.llm.model,
        tools = ?tools.list_tools(),
        "Crew dependencies ready"
    );

    if let Err(e) = provider.health_check().await {
        warn!(
            provider = provider.name(),
            base_url = %config.llm.base_url,
            error = %e,
            "LLM provider is not reachable yet; requests will fail until it is"
        );
    }

    let crew = NewsCrew::new(
        provider,
        Arc::new(tools),
        CrewSettings::from_config(config),
    );
    Ok(AppState::new(crew, config.server.max_concurrent_pipelines))
}

async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting news agent v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(build_state(&config).await?);
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| format!("invalid bind address '{}': {e}", config.bind_address()))?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
    };

    server::serve(state, addr, shutdown).await?;
    info!("Application shutdown complete");
    Ok(())
}

fn handle_config_command(config: &AppConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    // Secrets are part of a usable configuration
    config.get_search_api_key()?;
    config.get_llm_api_key()?;

    info!("Configuration validation complete");
    Ok(())
}
