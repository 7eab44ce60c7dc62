//! Memoria - curated conversational memory for coding agents
//!
//! Serves the memory HTTP API, or runs one-off curation and inspection
//! commands against the configured store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memoria::{
    api::build_app,
    config::MemoriaConfig,
    curator::{CurationSource, CurationTrigger},
    memory::open_store,
    session::SessionCoordinator,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memoria")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Curated conversational memory for coding agents")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMORIA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the memory HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Curate memories from a transcript file
    Curate {
        /// JSONL transcript to curate
        #[arg(long)]
        transcript: PathBuf,

        /// Session the memories belong to
        #[arg(long)]
        session_id: String,

        /// Project the memories belong to
        #[arg(long)]
        project_id: String,

        /// session_end, pre_compact or context_full
        #[arg(long, default_value = "session_end")]
        trigger: CurationTrigger,
    },

    /// Print store statistics
    Stats,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = MemoriaConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port } => run_server(config, host, port).await?,
        Commands::Curate {
            transcript,
            session_id,
            project_id,
            trigger,
        } => run_curate(config, transcript, &session_id, &project_id, trigger).await?,
        Commands::Stats => show_stats(config).await?,
        Commands::Config { default } => show_config(if default { None } else { Some(&config) })?,
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("memoria={},tower_http={}", level, level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Cancel the token on Ctrl+C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down...");
            cancel.cancel();
        }
    });
}

async fn run_server(mut config: MemoriaConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let shutdown = CancellationToken::new();
    let coordinator = Arc::new(SessionCoordinator::from_config(&config, shutdown.clone()).await?);
    let reaper = coordinator.sessions().spawn_reaper(
        Duration::from_secs(config.session.reap_interval_secs.max(1)),
        shutdown.clone(),
    );

    let app = build_app(Arc::clone(&coordinator), &config.server.cors_origins);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, "Memoria is running. Press Ctrl+C to stop.");
    cancel_on_ctrl_c(shutdown.clone());

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await?;

    let _ = reaper.await;
    Ok(())
}

async fn run_curate(
    config: MemoriaConfig,
    transcript: PathBuf,
    session_id: &str,
    project_id: &str,
    trigger: CurationTrigger,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let coordinator = SessionCoordinator::from_config(&config, shutdown).await?;
    let outcome = coordinator
        .try_checkpoint(
            session_id,
            project_id,
            trigger,
            Some(CurationSource::Transcript(transcript)),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn show_stats(config: MemoriaConfig) -> Result<()> {
    let store = open_store(&config.storage).await?;
    println!("{}", serde_json::to_string_pretty(&store.stats().await?)?);
    Ok(())
}

fn show_config(config: Option<&MemoriaConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
